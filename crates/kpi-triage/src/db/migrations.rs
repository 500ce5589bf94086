//! Schema versions for the ledger database.
//!
//! Applied versions are recorded in `_migrations`; each pending version runs
//! in its own transaction together with its bookkeeping row.

use chrono::Utc;
use rusqlite::{params, Connection, Transaction};

use super::error::DatabaseError;

enum Step {
    Sql(&'static str),
    /// No-op when the column is already there.
    AddColumn {
        table: &'static str,
        column: &'static str,
        decl: &'static str,
    },
}

struct Migration {
    version: u32,
    name: &'static str,
    step: Step,
}

const CREATE_LEDGER: &str = "
CREATE TABLE IF NOT EXISTS ledger_entries (
    message_id   TEXT PRIMARY KEY NOT NULL,
    disposition  TEXT NOT NULL,
    processed_at TEXT NOT NULL,
    entity       TEXT,
    sender       TEXT,
    subject      TEXT,
    folder       TEXT
);
CREATE INDEX IF NOT EXISTS idx_ledger_disposition ON ledger_entries (disposition);
";

const CREATE_TRIAGE: &str = "
CREATE TABLE IF NOT EXISTS quarantine_triage (
    message_id     TEXT PRIMARY KEY NOT NULL,
    label          TEXT NOT NULL,
    confidence     REAL NOT NULL DEFAULT 0,
    reasoning      TEXT NOT NULL DEFAULT '',
    has_kpi_data   INTEGER NOT NULL DEFAULT 0,
    suggested_kpis TEXT NOT NULL DEFAULT '',
    sender         TEXT,
    subject        TEXT,
    triaged_at     TEXT NOT NULL
);
";

const CREATE_RUNS: &str = "
CREATE TABLE IF NOT EXISTS runs (
    run_id      TEXT PRIMARY KEY NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    manifest    TEXT NOT NULL
);
";

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "ledger_entries",
        step: Step::Sql(CREATE_LEDGER),
    },
    Migration {
        version: 2,
        name: "quarantine_triage",
        step: Step::Sql(CREATE_TRIAGE),
    },
    Migration {
        version: 3,
        name: "runs",
        step: Step::Sql(CREATE_RUNS),
    },
    Migration {
        version: 4,
        name: "ledger_entries.run_id",
        step: Step::AddColumn {
            table: "ledger_entries",
            column: "run_id",
            decl: "TEXT",
        },
    },
];

/// Brings the schema up to the latest version.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version    INTEGER PRIMARY KEY,
            name       TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;
    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        let tx = conn.unchecked_transaction()?;
        apply(&tx, migration).map_err(|e| DatabaseError::Migration {
            version: migration.version,
            reason: e.to_string(),
        })?;
        tx.execute(
            "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        log::info!("Schema migrated to v{} ({})", migration.version, migration.name);
    }
    Ok(())
}

fn apply(tx: &Transaction<'_>, migration: &Migration) -> Result<(), DatabaseError> {
    match &migration.step {
        Step::Sql(sql) => tx.execute_batch(sql)?,
        Step::AddColumn {
            table,
            column,
            decl,
        } => {
            if column_exists(tx, table, column)? {
                log::debug!("Column {}.{} already present", table, column);
            } else {
                tx.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {};", table, column, decl))?;
            }
        }
    }
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("refusing table name '{}'", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}
