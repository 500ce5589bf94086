//! Dedup ledger: the sole source of idempotence across runs.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::db::{ledger_repo, Database, DatabaseError};

/// Terminal disposition of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// A record was written to the sink or its local fallback.
    Extracted,
    /// No source rule matched; routed to triage.
    Quarantined,
    /// Below the admission threshold.
    Rejected,
    /// Matched, but no document was eligible for extraction.
    Unsuitable,
    /// Extracted, but the validator dropped the record.
    Dropped,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Extracted => "extracted",
            Disposition::Quarantined => "quarantined",
            Disposition::Rejected => "rejected",
            Disposition::Unsuitable => "unsuitable",
            Disposition::Dropped => "dropped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "extracted" => Some(Disposition::Extracted),
            "quarantined" => Some(Disposition::Quarantined),
            "rejected" => Some(Disposition::Rejected),
            "unsuitable" => Some(Disposition::Unsuitable),
            "dropped" => Some(Disposition::Dropped),
            _ => None,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-authoritative descriptive fields stored next to a ledger entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditInfo {
    pub entity: Option<String>,
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub folder: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub message_id: String,
    pub disposition: Disposition,
    pub processed_at: DateTime<Utc>,
    pub audit: AuditInfo,
}

pub struct Ledger {
    db: Database,
    run_id: Option<String>,
}

impl Ledger {
    pub fn new(db: Database) -> Self {
        Self { db, run_id: None }
    }

    /// Tags every entry written through this handle with a run id.
    pub fn for_run(db: Database, run_id: impl Into<String>) -> Self {
        Self {
            db,
            run_id: Some(run_id.into()),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn is_processed(&self, message_id: &str) -> Result<bool, DatabaseError> {
        Ok(ledger_repo::find(&self.db, message_id)?.is_some())
    }

    /// Keeps the ids without a ledger entry, preserving input order.
    pub fn filter_unprocessed(&self, ids: Vec<String>) -> Result<Vec<String>, DatabaseError> {
        if ids.is_empty() {
            return Ok(ids);
        }
        let processed: HashSet<String> = ledger_repo::find_processed_ids(&self.db, &ids)?
            .into_iter()
            .collect();
        let total = ids.len();
        let unprocessed: Vec<String> = ids
            .into_iter()
            .filter(|id| !processed.contains(id))
            .collect();
        debug!(
            "Ledger filter: {} ids, {} already processed",
            total,
            total - unprocessed.len()
        );
        Ok(unprocessed)
    }

    /// Commits the terminal disposition of one message in its own transaction.
    ///
    /// Returns `false` if the message already had an entry; the earlier entry wins.
    pub fn record(
        &self,
        message_id: &str,
        disposition: Disposition,
        audit: AuditInfo,
    ) -> Result<bool, DatabaseError> {
        let row = ledger_repo::LedgerRow {
            message_id: message_id.to_string(),
            disposition: disposition.as_str().to_string(),
            processed_at: Utc::now().to_rfc3339(),
            run_id: self.run_id.clone(),
            entity: audit.entity,
            sender: audit.sender,
            subject: audit.subject,
            folder: audit.folder,
        };
        let inserted = self
            .db
            .with_transaction(|tx| ledger_repo::insert_with(tx, &row))?;
        if inserted {
            debug!("Ledger: {} -> {}", message_id, disposition);
        } else {
            warn!(
                "Ledger already holds an entry for {}; keeping the earlier disposition",
                message_id
            );
        }
        Ok(inserted)
    }

    pub fn entry(&self, message_id: &str) -> Result<Option<LedgerEntry>, DatabaseError> {
        let Some(row) = ledger_repo::find(&self.db, message_id)? else {
            return Ok(None);
        };
        let disposition =
            Disposition::parse(&row.disposition).ok_or_else(|| DatabaseError::CorruptRow {
                table: "ledger_entries",
                reason: format!("unknown disposition '{}'", row.disposition),
            })?;
        let processed_at = DateTime::parse_from_rfc3339(&row.processed_at)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| DatabaseError::CorruptRow {
                table: "ledger_entries",
                reason: format!("bad timestamp '{}': {}", row.processed_at, e),
            })?;
        Ok(Some(LedgerEntry {
            message_id: row.message_id,
            disposition,
            processed_at,
            audit: AuditInfo {
                entity: row.entity,
                sender: row.sender,
                subject: row.subject,
                folder: row.folder,
            },
        }))
    }

    pub fn stats(&self) -> Result<LedgerStats, DatabaseError> {
        Ok(LedgerStats {
            total: ledger_repo::count_all(&self.db)?,
            extracted: ledger_repo::count_by_disposition(&self.db, Disposition::Extracted.as_str())?,
            quarantined: ledger_repo::count_by_disposition(
                &self.db,
                Disposition::Quarantined.as_str(),
            )?,
            last_processed_at: ledger_repo::find_last_processed_at(&self.db)?,
        })
    }
}

#[derive(Debug)]
pub struct LedgerStats {
    pub total: u64,
    pub extracted: u64,
    pub quarantined: u64,
    /// RFC 3339 timestamp of the newest entry.
    pub last_processed_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ledger() -> Ledger {
        Ledger::for_run(
            Database::open_in_memory().expect("Failed to create test database"),
            "run-1",
        )
    }

    #[test]
    fn test_record_and_check() {
        let ledger = test_ledger();
        assert!(!ledger.is_processed("m1").unwrap());
        assert!(ledger
            .record("m1", Disposition::Extracted, AuditInfo::default())
            .unwrap());
        assert!(ledger.is_processed("m1").unwrap());
    }

    #[test]
    fn test_second_record_is_noop() {
        let ledger = test_ledger();
        ledger
            .record("m1", Disposition::Quarantined, AuditInfo::default())
            .unwrap();
        assert!(!ledger
            .record("m1", Disposition::Extracted, AuditInfo::default())
            .unwrap());

        let entry = ledger.entry("m1").unwrap().unwrap();
        assert_eq!(entry.disposition, Disposition::Quarantined);
        assert_eq!(ledger.stats().unwrap().total, 1);
    }

    #[test]
    fn test_filter_unprocessed_preserves_order() {
        let ledger = test_ledger();
        ledger
            .record("b", Disposition::Rejected, AuditInfo::default())
            .unwrap();

        let ids = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(
            ledger.filter_unprocessed(ids).unwrap(),
            vec!["c".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_entry_round_trips_audit_fields() {
        let ledger = test_ledger();
        let audit = AuditInfo {
            entity: Some("acme".to_string()),
            sender: Some("cfo@acme.com".to_string()),
            subject: Some("Weekly Cash Snapshot".to_string()),
            folder: Some("Inbox".to_string()),
        };
        ledger
            .record("m1", Disposition::Extracted, audit.clone())
            .unwrap();
        let entry = ledger.entry("m1").unwrap().unwrap();
        assert_eq!(entry.audit, audit);
        assert!(ledger.entry("missing").unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let ledger = test_ledger();
        ledger
            .record("a", Disposition::Extracted, AuditInfo::default())
            .unwrap();
        ledger
            .record("b", Disposition::Quarantined, AuditInfo::default())
            .unwrap();
        ledger
            .record("c", Disposition::Rejected, AuditInfo::default())
            .unwrap();

        let stats = ledger.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.extracted, 1);
        assert_eq!(stats.quarantined, 1);
        assert!(stats.last_processed_at.is_some());
    }

    #[test]
    fn test_disposition_names() {
        for d in [
            Disposition::Extracted,
            Disposition::Quarantined,
            Disposition::Rejected,
            Disposition::Unsuitable,
            Disposition::Dropped,
        ] {
            assert_eq!(Disposition::parse(d.as_str()), Some(d));
        }
        assert_eq!(Disposition::parse("bogus"), None);
    }
}
