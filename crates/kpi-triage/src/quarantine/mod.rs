//! Classify-only path for candidates no source rule claimed.
//!
//! Results are persisted for later manual promotion into new source rules.
//! A classifier failure labels the candidate `unknown`; it never aborts a run.

pub mod llm;
pub mod suggest;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::schema::TriageSettings;
use crate::db::{triage_repo, Database};
use crate::error::CollaboratorError;
use crate::kpi::KpiField;
use crate::scoring::Candidate;

pub use llm::LlmTriageClassifier;
pub use suggest::{drafts_to_yaml, suggest_source_rules, SuggestOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageLabel {
    FinancialReport,
    DealDiscussion,
    LegalNoise,
    Operational,
    Unknown,
}

impl TriageLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriageLabel::FinancialReport => "financial_report",
            TriageLabel::DealDiscussion => "deal_discussion",
            TriageLabel::LegalNoise => "legal_noise",
            TriageLabel::Operational => "operational",
            TriageLabel::Unknown => "unknown",
        }
    }

    /// Anything outside the fixed label set maps to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "financial_report" => TriageLabel::FinancialReport,
            "deal_discussion" => TriageLabel::DealDiscussion,
            "legal_noise" => TriageLabel::LegalNoise,
            "operational" => TriageLabel::Operational,
            _ => TriageLabel::Unknown,
        }
    }
}

impl fmt::Display for TriageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub label: TriageLabel,
    pub confidence: f64,
    pub reasoning: String,
    pub has_kpi_data: bool,
    pub suggested_kpis: Vec<KpiField>,
}

impl TriageResult {
    pub fn unknown(reasoning: impl Into<String>) -> Self {
        Self {
            label: TriageLabel::Unknown,
            confidence: 0.0,
            reasoning: reasoning.into(),
            has_kpi_data: false,
            suggested_kpis: Vec::new(),
        }
    }
}

#[async_trait]
pub trait TriageClassifier: Send + Sync {
    async fn classify(&self, candidate: &Candidate) -> Result<TriageResult, CollaboratorError>;
}

/// Stand-in when no classifier endpoint is configured.
pub struct UnavailableClassifier;

#[async_trait]
impl TriageClassifier for UnavailableClassifier {
    async fn classify(&self, _candidate: &Candidate) -> Result<TriageResult, CollaboratorError> {
        Err(CollaboratorError::InvalidResponse(
            "no triage classifier configured".to_string(),
        ))
    }
}

/// HTTP classifier for the configured endpoint, or a stand-in that always
/// reports itself unavailable.
pub fn classifier_from_settings(settings: &TriageSettings) -> Arc<dyn TriageClassifier> {
    let Some(endpoint) = &settings.endpoint else {
        return Arc::new(UnavailableClassifier);
    };
    match LlmTriageClassifier::new(
        endpoint,
        Duration::from_secs(settings.timeout_secs),
        settings.body_chars,
    ) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            tracing::warn!(error = %e, "Triage classifier unavailable");
            Arc::new(UnavailableClassifier)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageSummary {
    pub total: usize,
    pub triaged: usize,
    pub classified: usize,
    pub failed: usize,
    pub skipped_over_cap: usize,
    pub by_label: BTreeMap<String, usize>,
}

pub struct QuarantineTriage {
    classifier: Arc<dyn TriageClassifier>,
    settings: TriageSettings,
    db: Option<Database>,
}

impl QuarantineTriage {
    pub fn new(
        classifier: Arc<dyn TriageClassifier>,
        settings: &TriageSettings,
        db: Option<Database>,
    ) -> Self {
        Self {
            classifier,
            settings: settings.clone(),
            db,
        }
    }

    /// Builds the HTTP classifier when an endpoint is configured.
    pub fn from_settings(settings: &TriageSettings, db: Option<Database>) -> Self {
        Self::new(classifier_from_settings(settings), settings, db)
    }

    /// Classifies one candidate. Returns the result and whether the classifier failed.
    pub async fn triage(&self, candidate: &Candidate) -> (TriageResult, bool) {
        let timeout = Duration::from_secs(self.settings.timeout_secs);
        match tokio::time::timeout(timeout, self.classifier.classify(candidate)).await {
            Ok(Ok(result)) => (result, false),
            Ok(Err(e)) => {
                tracing::warn!(message_id = %candidate.message.id, error = %e, "Triage failed; labelling unknown");
                (TriageResult::unknown(format!("classification failed: {}", e)), true)
            }
            Err(_) => {
                let e = CollaboratorError::Timeout {
                    collaborator: "triage classifier",
                    after: timeout,
                };
                tracing::warn!(message_id = %candidate.message.id, "{}", e);
                (TriageResult::unknown(e.to_string()), true)
            }
        }
    }

    /// Classifies up to `max_per_run` candidates in order, pausing between
    /// calls, and persists every result.
    pub async fn triage_batch(
        &self,
        candidates: &[&Candidate],
    ) -> (Vec<(String, TriageResult)>, TriageSummary) {
        let mut summary = TriageSummary {
            total: candidates.len(),
            ..TriageSummary::default()
        };
        if !self.settings.enabled {
            tracing::info!(total = candidates.len(), "Quarantine triage disabled");
            summary.skipped_over_cap = candidates.len();
            return (Vec::new(), summary);
        }

        let limit = self.settings.max_per_run.min(candidates.len());
        summary.skipped_over_cap = candidates.len() - limit;
        tracing::info!(
            triaging = limit,
            total = candidates.len(),
            "Running quarantine triage"
        );

        let mut results = Vec::with_capacity(limit);
        for (i, candidate) in candidates.iter().copied().take(limit).enumerate() {
            if i > 0 && self.settings.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.delay_ms)).await;
            }
            let (result, failed) = self.triage(candidate).await;
            summary.triaged += 1;
            if failed {
                summary.failed += 1;
            } else {
                summary.classified += 1;
            }
            *summary
                .by_label
                .entry(result.label.as_str().to_string())
                .or_default() += 1;
            self.persist(candidate, &result);
            results.push((candidate.message.id.clone(), result));
        }

        tracing::info!(
            classified = summary.classified,
            failed = summary.failed,
            by_label = ?summary.by_label,
            "Quarantine triage complete"
        );
        (results, summary)
    }

    fn persist(&self, candidate: &Candidate, result: &TriageResult) {
        let Some(db) = &self.db else {
            return;
        };
        let row = triage_repo::TriageRow {
            message_id: candidate.message.id.clone(),
            label: result.label.as_str().to_string(),
            confidence: result.confidence,
            reasoning: result.reasoning.clone(),
            has_kpi_data: result.has_kpi_data,
            suggested_kpis: result
                .suggested_kpis
                .iter()
                .map(KpiField::as_str)
                .collect::<Vec<_>>()
                .join(","),
            sender: Some(candidate.message.sender.address.clone()),
            subject: Some(candidate.message.subject.clone()),
            triaged_at: Utc::now().to_rfc3339(),
        };
        if let Err(e) = triage_repo::upsert(db, &row) {
            tracing::warn!(message_id = %candidate.message.id, error = %e, "Failed to persist triage result");
        }
    }
}
