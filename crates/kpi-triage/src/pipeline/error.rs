use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures that stop a run before or outside per-message processing.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] crate::error::ConfigError),

    #[error("Collaborator setup failed: {0}")]
    Collaborator(#[from] crate::error::CollaboratorError),

    #[error("Ledger unavailable: {0}")]
    Ledger(#[from] crate::db::DatabaseError),

    #[error("Mail source failed: {0}")]
    Mail(#[from] crate::mail::MailError),
}

/// Per-message failure taxonomy reported in the run manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Unreadable attachment, unresolved sender, unparseable mail item.
    InputDefect,
    /// Oracle, text recovery or triage classifier unavailable.
    CollaboratorFailure,
    /// Plausibility bound breached on an emitted record.
    DataQuality,
    /// Row reached neither the sink nor the fallback.
    SinkFailure,
}

/// Non-fatal problem attached to one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageIssue {
    pub category: FailureCategory,
    pub detail: String,
}

impl MessageIssue {
    pub fn new(category: FailureCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            detail: detail.into(),
        }
    }
}
