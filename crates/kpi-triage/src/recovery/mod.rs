//! Text recovery for documents without a usable text layer.
//!
//! Recovery is optional. Every failure mode (disabled, missing raw bytes,
//! engine error, timeout) is reported as [`RecoveryOutcome::Unavailable`] so
//! callers branch on data instead of errors.

#[cfg(feature = "ocr")]
pub mod tesseract;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::Instrument;

use crate::config::schema::RecoveryConfig;
use crate::document::Document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Recovered(String),
    Unavailable(String),
}

#[async_trait]
pub trait TextRecovery: Send + Sync {
    async fn recover(&self, document: &Document) -> RecoveryOutcome;
}

/// Used when recovery is disabled or not compiled in.
pub struct NoRecovery;

#[async_trait]
impl TextRecovery for NoRecovery {
    async fn recover(&self, _document: &Document) -> RecoveryOutcome {
        RecoveryOutcome::Unavailable("text recovery disabled".to_string())
    }
}

/// Runs `recovery` under a hard timeout. Blank output counts as unavailable.
pub async fn recover_with_timeout(
    recovery: &dyn TextRecovery,
    document: &Document,
    timeout: Duration,
) -> RecoveryOutcome {
    let span = tracing::info_span!("text_recovery", document = %document.label());
    let attempt = tokio::time::timeout(timeout, recovery.recover(document)).instrument(span);
    match attempt.await {
        Ok(RecoveryOutcome::Recovered(text)) if text.trim().is_empty() => {
            RecoveryOutcome::Unavailable("recovered text was empty".to_string())
        }
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(after = ?timeout, "Text recovery timed out");
            RecoveryOutcome::Unavailable(format!("timed out after {:?}", timeout))
        }
    }
}

/// Builds the configured recovery backend.
pub fn from_config(config: &RecoveryConfig) -> Arc<dyn TextRecovery> {
    if !config.enabled {
        return Arc::new(NoRecovery);
    }
    #[cfg(feature = "ocr")]
    {
        Arc::new(tesseract::TesseractRecovery::new(&config.languages, config.dpi))
    }
    #[cfg(not(feature = "ocr"))]
    {
        tracing::warn!("Text recovery enabled but the crate was built without the `ocr` feature");
        Arc::new(NoRecovery)
    }
}
