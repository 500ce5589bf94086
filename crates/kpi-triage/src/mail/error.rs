//! Mail source error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail directory '{0}' does not exist")]
    MissingDirectory(PathBuf),

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("IO error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mail source unavailable: {0}")]
    Unavailable(String),
}
