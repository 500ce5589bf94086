use crate::extract::ExtractionOutcome;
use crate::ledger::Disposition;
use crate::matching::{RuleScore, SourceMatch};
use crate::scoring::Candidate;
use crate::suitability::AssessedDocument;
use crate::validate::ValidationOutcome;

use super::error::{FailureCategory, MessageIssue};

/// Where a message stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Rejected,
    Quarantined,
    Unsuitable,
    Dropped,
    /// Record ready for the sink; the ledger entry waits for a durable write.
    AwaitingSink,
}

impl Stage {
    /// Disposition to commit right away, if the message never reaches the sink.
    pub fn immediate_disposition(&self) -> Option<Disposition> {
        match self {
            Stage::Rejected => Some(Disposition::Rejected),
            Stage::Quarantined => Some(Disposition::Quarantined),
            Stage::Unsuitable => Some(Disposition::Unsuitable),
            Stage::Dropped => Some(Disposition::Dropped),
            Stage::AwaitingSink => None,
        }
    }
}

pub struct PipelineContext {
    // Input, scored. Owns the message.
    pub candidate: Candidate,

    // Step 2 result
    pub source: Option<SourceMatch>,
    pub top_scores: Vec<RuleScore>,

    // Step 3 result
    pub assessed: Vec<AssessedDocument>,

    // Step 4 result
    pub extraction: Option<ExtractionOutcome>,

    // Step 5 result
    pub validation: Option<ValidationOutcome>,

    pub stage: Stage,

    // Non-fatal problems
    pub issues: Vec<MessageIssue>,
}

impl PipelineContext {
    pub fn new(candidate: Candidate) -> Self {
        Self {
            candidate,
            source: None,
            top_scores: Vec::new(),
            assessed: Vec::new(),
            extraction: None,
            validation: None,
            stage: Stage::Rejected,
            issues: Vec::new(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.candidate.message.id
    }

    pub fn issue(&mut self, category: FailureCategory, detail: impl Into<String>) {
        self.issues.push(MessageIssue::new(category, detail));
    }
}
