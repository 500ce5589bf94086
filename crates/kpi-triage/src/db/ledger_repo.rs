//! Ledger repository: CRUD operations for the `ledger_entries` table.
//!
//! The message identifier is the only key. The descriptive columns are
//! audit metadata and carry no meaning for idempotence.

use rusqlite::{params, Connection, OptionalExtension};

use super::{Database, DatabaseError};

/// A raw ledger row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub message_id: String,
    pub disposition: String,
    pub processed_at: String,
    pub run_id: Option<String>,
    pub entity: Option<String>,
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub folder: Option<String>,
}

/// Inserts a ledger row. Returns `false` when an entry for the message
/// already exists, in which case the stored row is left untouched.
pub fn insert(db: &Database, row: &LedgerRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| insert_with(conn, row))
}

/// Inserts a ledger row on an existing connection or transaction.
pub fn insert_with(conn: &Connection, row: &LedgerRow) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO ledger_entries
            (message_id, disposition, processed_at, run_id, entity, sender, subject, folder)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            row.message_id,
            row.disposition,
            row.processed_at,
            row.run_id,
            row.entity,
            row.sender,
            row.subject,
            row.folder,
        ],
    )?;
    Ok(changed == 1)
}

/// Finds the ledger row for a message.
pub fn find(db: &Database, message_id: &str) -> Result<Option<LedgerRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT message_id, disposition, processed_at, run_id, entity, sender, subject, folder
                 FROM ledger_entries WHERE message_id = ?1",
                params![message_id],
                |r| {
                    Ok(LedgerRow {
                        message_id: r.get(0)?,
                        disposition: r.get(1)?,
                        processed_at: r.get(2)?,
                        run_id: r.get(3)?,
                        entity: r.get(4)?,
                        sender: r.get(5)?,
                        subject: r.get(6)?,
                        folder: r.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    })
}

/// Returns every id from `message_ids` that already has a ledger entry.
pub fn find_processed_ids(
    db: &Database,
    message_ids: &[String],
) -> Result<Vec<String>, DatabaseError> {
    if message_ids.is_empty() {
        return Ok(Vec::new());
    }

    db.with_conn(|conn| {
        let mut found = Vec::new();
        // SQLite caps bound parameters; query in chunks.
        for chunk in message_ids.chunks(500) {
            let placeholders: Vec<String> =
                (0..chunk.len()).map(|i| format!("?{}", i + 1)).collect();
            let sql = format!(
                "SELECT message_id FROM ledger_entries WHERE message_id IN ({})",
                placeholders.join(", ")
            );
            let params_ref: Vec<&dyn rusqlite::types::ToSql> = chunk
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_ref.as_slice(), |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            found.extend(rows);
        }
        Ok(found)
    })
}

/// Counts ledger entries with the given disposition.
pub fn count_by_disposition(db: &Database, disposition: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM ledger_entries WHERE disposition = ?1",
            params![disposition],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Counts all ledger entries.
pub fn count_all(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM ledger_entries", [], |r| r.get(0))?;
        Ok(count)
    })
}

/// Finds the timestamp of the most recently processed message.
pub fn find_last_processed_at(db: &Database) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let value = conn
            .query_row(
                "SELECT processed_at FROM ledger_entries ORDER BY processed_at DESC LIMIT 1",
                [],
                |r| r.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    })
}
