//! Run history: one row per completed run with its serialized manifest.

use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    /// Manifest serialized as JSON.
    pub manifest: String,
}

pub fn insert(db: &Database, row: &RunRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR REPLACE INTO runs (run_id, started_at, finished_at, manifest)
             VALUES (?1, ?2, ?3, ?4)",
            params![row.run_id, row.started_at, row.finished_at, row.manifest],
        )?;
        Ok(())
    })
}

pub fn find(db: &Database, run_id: &str) -> Result<Option<RunRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT run_id, started_at, finished_at, manifest FROM runs WHERE run_id = ?1",
                params![run_id],
                |r| {
                    Ok(RunRow {
                        run_id: r.get(0)?,
                        started_at: r.get(1)?,
                        finished_at: r.get(2)?,
                        manifest: r.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    })
}

/// Returns the most recent runs, newest first.
pub fn list_recent(db: &Database, limit: u32) -> Result<Vec<RunRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT run_id, started_at, finished_at, manifest FROM runs
             ORDER BY started_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |r| {
                Ok(RunRow {
                    run_id: r.get(0)?,
                    started_at: r.get(1)?,
                    finished_at: r.get(2)?,
                    manifest: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
