//! CSV-backed sink and the local durable fallback.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};

use crate::error::SinkError;
use crate::sanitize::redact_path;

use super::row::{SinkRow, COLUMN_ORDER};
use super::{AppendOutcome, RecordSink};

/// Appends rows, writing the header first when the file is new or empty.
pub fn append_rows(path: &Path, rows: &[SinkRow]) -> Result<usize, SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| SinkError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let mut writer = csv::Writer::from_writer(file);
    if needs_header {
        writer.write_record(COLUMN_ORDER)?;
    }
    for row in rows {
        writer.write_record(row.values())?;
    }
    writer.flush().map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Appended {} rows to {}", rows.len(), redact_path(path));
    Ok(rows.len())
}

/// Primary sink writing to a CSV file.
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSink for CsvFileSink {
    fn name(&self) -> &str {
        "csv"
    }

    async fn append(&self, rows: &[SinkRow]) -> AppendOutcome {
        match append_rows(&self.path, rows) {
            Ok(rows) => AppendOutcome::Appended { rows },
            Err(e) => AppendOutcome::Failed(e.to_string()),
        }
    }
}

/// Local durable format for rows the primary sink could not take.
#[derive(Debug, Clone)]
pub struct CsvFallback {
    path: PathBuf,
}

impl CsvFallback {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, rows: &[SinkRow]) -> Result<usize, SinkError> {
        let written = append_rows(&self.path, rows)?;
        info!(
            "Wrote {} rows to fallback file {}",
            written,
            redact_path(&self.path)
        );
        Ok(written)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn row(message_id: &str) -> SinkRow {
        SinkRow {
            date: "2026-03-02".to_string(),
            entity: "acme".to_string(),
            revenue: None,
            cash: Some(45000.0),
            pipeline_value: None,
            closings_count: None,
            orders_count: None,
            occupancy: None,
            alerts: String::new(),
            notes: String::new(),
            run_id: "run-1".to_string(),
            message_id: message_id.to_string(),
            sender: "cfo@acme.com".to_string(),
            subject: "Weekly, Cash".to_string(),
            candidate_score: 7,
            candidate_reasons: String::new(),
            source_type: "pattern".to_string(),
            attachment_name: String::new(),
            evidence_snippet: String::new(),
            extractor_version: "1".to_string(),
            confidence: 0.9,
            validation_flags: String::new(),
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/rows.csv");
        append_rows(&path, &[row("a")]).unwrap();
        append_rows(&path, &[row("b"), row("c")]).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), COLUMN_ORDER.len());
        assert_eq!(&headers[0], "date");
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(&records[1][11], "b");
        assert_eq!(&records[0][13], "Weekly, Cash");
    }

    #[tokio::test]
    async fn test_csv_sink_appends() {
        let dir = TempDir::new().unwrap();
        let sink = CsvFileSink::new(dir.path().join("rows.csv"));
        assert_eq!(
            sink.append(&[row("a")]).await,
            AppendOutcome::Appended { rows: 1 }
        );
    }

    #[tokio::test]
    async fn test_csv_sink_reports_io_failure() {
        let dir = TempDir::new().unwrap();
        // A directory at the file path cannot be opened for append.
        let sink = CsvFileSink::new(dir.path());
        assert!(matches!(
            sink.append(&[row("a")]).await,
            AppendOutcome::Failed(_)
        ));
    }
}
