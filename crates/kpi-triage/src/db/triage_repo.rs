//! Quarantine triage repository, kept for later manual promotion of
//! quarantined senders into new source rules.

use rusqlite::params;

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct TriageRow {
    pub message_id: String,
    pub label: String,
    pub confidence: f64,
    pub reasoning: String,
    pub has_kpi_data: bool,
    /// Comma-separated KPI field names.
    pub suggested_kpis: String,
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub triaged_at: String,
}

fn map_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<TriageRow> {
    Ok(TriageRow {
        message_id: r.get(0)?,
        label: r.get(1)?,
        confidence: r.get(2)?,
        reasoning: r.get(3)?,
        has_kpi_data: r.get(4)?,
        suggested_kpis: r.get(5)?,
        sender: r.get(6)?,
        subject: r.get(7)?,
        triaged_at: r.get(8)?,
    })
}

/// Inserts or replaces the triage result for a message.
pub fn upsert(db: &Database, row: &TriageRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO quarantine_triage
                (message_id, label, confidence, reasoning, has_kpi_data, suggested_kpis, sender, subject, triaged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(message_id) DO UPDATE SET
                label = excluded.label,
                confidence = excluded.confidence,
                reasoning = excluded.reasoning,
                has_kpi_data = excluded.has_kpi_data,
                suggested_kpis = excluded.suggested_kpis,
                triaged_at = excluded.triaged_at",
            params![
                row.message_id,
                row.label,
                row.confidence,
                row.reasoning,
                row.has_kpi_data,
                row.suggested_kpis,
                row.sender,
                row.subject,
                row.triaged_at,
            ],
        )?;
        Ok(())
    })
}

/// Lists triage results with the given label, newest first.
pub fn find_by_label(db: &Database, label: &str) -> Result<Vec<TriageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT message_id, label, confidence, reasoning, has_kpi_data, suggested_kpis, sender, subject, triaged_at
             FROM quarantine_triage WHERE label = ?1
             ORDER BY triaged_at DESC, message_id ASC",
        )?;
        let rows = stmt
            .query_map(params![label], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Results with the given label that carried KPI data at or above
/// `min_confidence` and have a known sender, ordered by sender.
pub fn find_promotable(
    db: &Database,
    label: &str,
    min_confidence: f64,
) -> Result<Vec<TriageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT message_id, label, confidence, reasoning, has_kpi_data, suggested_kpis, sender, subject, triaged_at
             FROM quarantine_triage
             WHERE label = ?1 AND has_kpi_data = 1 AND confidence >= ?2 AND sender IS NOT NULL
             ORDER BY sender ASC, message_id ASC",
        )?;
        let rows = stmt
            .query_map(params![label, min_confidence], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts triage results per label, ordered by label.
pub fn count_by_label(db: &Database) -> Result<Vec<(String, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT label, COUNT(*) FROM quarantine_triage GROUP BY label ORDER BY label",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
