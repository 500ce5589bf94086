//! Run manifest: counts, failure categories and per-message dispositions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::Disposition;
use crate::quarantine::TriageSummary;

use super::error::{FailureCategory, MessageIssue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageCounts {
    pub scanned: usize,
    pub duplicates: usize,
    pub skipped_ledger: usize,
    pub candidates: usize,
    pub rejected: usize,
    pub matched: usize,
    pub quarantined: usize,
    pub unsuitable: usize,
    pub triaged: usize,
    pub extracted: usize,
    pub dropped: usize,
    pub flagged: usize,
    pub appended: usize,
    pub fallback_rows: usize,
}

/// Outcome of one message, listed in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageOutcome {
    pub message_id: String,
    /// `None` when the record reached neither the sink nor the fallback; the
    /// message has no ledger entry and is retried next run.
    pub disposition: Option<Disposition>,
    pub score: i32,
    pub entity: Option<String>,
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<MessageIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_version: String,
    pub config_fingerprint: String,
    pub counts: StageCounts,
    pub failures: BTreeMap<FailureCategory, usize>,
    pub messages: Vec<MessageOutcome>,
    pub triage: TriageSummary,
}

impl RunManifest {
    pub fn new(
        run_id: impl Into<String>,
        started_at: DateTime<Utc>,
        config_version: impl Into<String>,
        config_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            started_at,
            finished_at: None,
            config_version: config_version.into(),
            config_fingerprint: config_fingerprint.into(),
            counts: StageCounts::default(),
            failures: BTreeMap::new(),
            messages: Vec::new(),
            triage: TriageSummary::default(),
        }
    }

    pub fn count_failure(&mut self, category: FailureCategory, n: usize) {
        if n > 0 {
            *self.failures.entry(category).or_default() += n;
        }
    }

    pub fn failures_of(&self, category: FailureCategory) -> usize {
        self.failures.get(&category).copied().unwrap_or(0)
    }

    pub fn outcome(&self, message_id: &str) -> Option<&MessageOutcome> {
        self.messages.iter().find(|m| m.message_id == message_id)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
