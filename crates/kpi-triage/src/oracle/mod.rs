//! Model-assisted extraction pass.
//!
//! The oracle proposes per-field values for a bounded excerpt. Proposals are
//! advisory: they pass through [`screen_proposal`] and only ever fill fields
//! the pattern pass left null.

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::Instrument;

use crate::config::schema::OracleConfig;
use crate::error::CollaboratorError;
use crate::kpi::{FieldKind, KpiField};

pub use http::HttpOracle;

#[derive(Debug, Clone)]
pub struct OracleRequest<'a> {
    /// Document label, for logging only.
    pub document: &'a str,
    pub excerpt: &'a str,
    pub fields: &'a [KpiField],
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldProposal {
    pub field: KpiField,
    pub value: Option<f64>,
    pub evidence: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OracleResponse {
    Proposals(Vec<FieldProposal>),
    Unavailable(String),
}

#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// Disabled oracles are skipped without a call.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn propose(&self, request: &OracleRequest<'_>) -> OracleResponse;
}

pub struct DisabledOracle;

#[async_trait]
impl ExtractionOracle for DisabledOracle {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn propose(&self, _request: &OracleRequest<'_>) -> OracleResponse {
        OracleResponse::Unavailable("oracle disabled".to_string())
    }
}

/// Calls `oracle` under a hard timeout.
pub async fn propose_with_timeout(
    oracle: &dyn ExtractionOracle,
    request: &OracleRequest<'_>,
    timeout: Duration,
) -> OracleResponse {
    if !oracle.is_enabled() {
        return OracleResponse::Unavailable("oracle disabled".to_string());
    }
    let span = tracing::info_span!("oracle", document = %request.document);
    match tokio::time::timeout(timeout, oracle.propose(request))
        .instrument(span)
        .await
    {
        Ok(response) => response,
        Err(_) => {
            let err = CollaboratorError::Timeout {
                collaborator: "extraction oracle",
                after: timeout,
            };
            tracing::warn!(document = %request.document, "{}", err);
            OracleResponse::Unavailable(err.to_string())
        }
    }
}

/// Applies the plausibility screen to one proposal.
///
/// Money below 100 or shaped like a year is rejected, occupancy above 1 is
/// read as a percentage, counts must be whole numbers.
pub fn screen_proposal(
    proposal: &FieldProposal,
    min_confidence: f64,
) -> Result<FieldProposal, String> {
    let Some(value) = proposal.value else {
        return Err("null".to_string());
    };
    if !value.is_finite() {
        return Err(format!("non-finite value {}", value));
    }
    if proposal.confidence < min_confidence {
        return Err(format!(
            "confidence {:.2} below {:.2}",
            proposal.confidence, min_confidence
        ));
    }

    let value = match proposal.field.kind() {
        FieldKind::Money => {
            if value < 100.0 {
                return Err(format!("{} below 100", value));
            }
            if value.fract() == 0.0 && (1900.0..=2099.0).contains(&value) {
                return Err(format!("{} looks like a year", value));
            }
            value
        }
        FieldKind::Ratio => {
            let ratio = if value > 1.0 { value / 100.0 } else { value };
            if !(0.0..=1.0).contains(&ratio) {
                return Err(format!("{} outside 0-1", value));
            }
            ratio
        }
        FieldKind::Count => {
            if value.fract() != 0.0 {
                return Err(format!("{} is not a whole number", value));
            }
            value
        }
    };

    Ok(FieldProposal {
        value: Some(value),
        ..proposal.clone()
    })
}

/// Builds the configured oracle. A disabled oracle never fails to build.
pub fn from_config(config: &OracleConfig) -> Result<Arc<dyn ExtractionOracle>, CollaboratorError> {
    match (config.enabled, &config.endpoint) {
        (true, Some(endpoint)) => Ok(Arc::new(HttpOracle::new(
            endpoint,
            Duration::from_secs(config.timeout_secs),
            config.max_excerpt_chars,
        )?)),
        _ => Ok(Arc::new(DisabledOracle)),
    }
}
