use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Mail source error: {0}")]
    Mail(#[from] crate::mail::MailError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid pattern '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("Invalid rule '{id}': {reason}")]
    InvalidRule { id: String, reason: String },

    #[error("Unknown KPI field '{field}' in {context}")]
    UnknownField { context: String, field: String },
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported attachment format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode PDF: {0}")]
    Pdf(String),

    #[error("Failed to decode spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("Failed to decode text: {0}")]
    Text(String),
}

/// Failures of optional collaborators (oracle, text recovery, triage classifier).
///
/// These never abort a run; callers turn them into an "unavailable" branch.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("{collaborator} timed out after {after:?}")]
    Timeout {
        collaborator: &'static str,
        after: Duration,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Secret unavailable: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Sink rejected the batch: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, TriageError>;
