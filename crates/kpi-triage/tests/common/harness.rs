//! Test harness for isolated pipeline runs.
//!
//! Each `TestHarness` owns a temp directory holding the ledger database and
//! the fallback CSV, so a test can build several pipelines over the same
//! ledger to exercise cross-run behavior.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use kpi_triage::config::schema::TriageConfig;
use kpi_triage::db::Database;
use kpi_triage::document::Document;
use kpi_triage::error::CollaboratorError;
use kpi_triage::oracle::{ExtractionOracle, FieldProposal, OracleRequest, OracleResponse};
use kpi_triage::pipeline::{Collaborators, NoopProgress, Pipeline, RunManifest};
use kpi_triage::quarantine::{TriageClassifier, TriageLabel, TriageResult};
use kpi_triage::recovery::{RecoveryOutcome, TextRecovery};
use kpi_triage::scoring::Candidate;
use kpi_triage::sink::{AppendOutcome, CsvFallback, RecordSink, SinkRow};
use kpi_triage::{KpiField, MailSource, MemoryMailSource, Message};

use super::builders::run_clock;

/// Oracle answering every request with the same proposals.
pub struct ScriptedOracle {
    proposals: Vec<FieldProposal>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn proposing(proposals: &[(KpiField, f64, &str)]) -> Arc<Self> {
        Arc::new(Self {
            proposals: proposals
                .iter()
                .map(|(field, value, evidence)| FieldProposal {
                    field: *field,
                    value: Some(*value),
                    evidence: evidence.to_string(),
                    confidence: 0.8,
                })
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn silent() -> Arc<Self> {
        Self::proposing(&[])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionOracle for ScriptedOracle {
    async fn propose(&self, _request: &OracleRequest<'_>) -> OracleResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        OracleResponse::Proposals(self.proposals.clone())
    }
}

/// Sink that plays back a script of outcomes, then appends everything.
///
/// When `max_rows` is set, any call with more rows is rate limited.
pub struct ScriptedSink {
    script: Mutex<VecDeque<AppendOutcome>>,
    max_rows: Option<usize>,
    calls: Mutex<Vec<usize>>,
    rows: Mutex<Vec<SinkRow>>,
}

impl ScriptedSink {
    pub fn accepting() -> Arc<Self> {
        Self::scripted(vec![])
    }

    pub fn scripted(script: Vec<AppendOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            max_rows: None,
            calls: Mutex::new(Vec::new()),
            rows: Mutex::new(Vec::new()),
        })
    }

    pub fn limited_to(max_rows: usize) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            max_rows: Some(max_rows),
            calls: Mutex::new(Vec::new()),
            rows: Mutex::new(Vec::new()),
        })
    }

    pub fn unavailable(times: usize) -> Arc<Self> {
        Self::scripted(vec![AppendOutcome::Unavailable("HTTP 503".to_string()); times])
    }

    /// Row count of every append call, in order.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }

    /// Message ids the sink accepted.
    pub fn appended(&self) -> Vec<String> {
        self.rows().into_iter().map(|r| r.message_id).collect()
    }

    pub fn rows(&self) -> Vec<SinkRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSink for ScriptedSink {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn append(&self, rows: &[SinkRow]) -> AppendOutcome {
        self.calls.lock().unwrap().push(rows.len());
        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            return outcome;
        }
        if self.max_rows.is_some_and(|max| rows.len() > max) {
            return AppendOutcome::RateLimited { retry_after: None };
        }
        self.rows.lock().unwrap().extend(rows.iter().cloned());
        AppendOutcome::Appended { rows: rows.len() }
    }
}

/// Triage classifier returning one fixed label.
pub struct FixedClassifier {
    label: TriageLabel,
    calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(label: TriageLabel) -> Arc<Self> {
        Arc::new(Self {
            label,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TriageClassifier for FixedClassifier {
    async fn classify(&self, _candidate: &Candidate) -> Result<TriageResult, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TriageResult {
            label: self.label,
            confidence: 0.9,
            reasoning: "scripted".to_string(),
            has_kpi_data: self.label == TriageLabel::FinancialReport,
            suggested_kpis: vec![],
        })
    }
}

/// Text recovery returning canned text for every document.
pub struct CannedRecovery(pub Option<String>);

#[async_trait]
impl TextRecovery for CannedRecovery {
    async fn recover(&self, _document: &Document) -> RecoveryOutcome {
        match &self.0 {
            Some(text) => RecoveryOutcome::Recovered(text.clone()),
            None => RecoveryOutcome::Unavailable("engine not installed".to_string()),
        }
    }
}

/// Test harness providing an isolated ledger and fallback file.
pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub fallback_path: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("state").join("ledger.db");
        let fallback_path = temp_dir.path().join("out").join("fallback.csv");
        std::fs::create_dir_all(fallback_path.parent().unwrap())
            .expect("Failed to create output dir");
        Self {
            temp_dir,
            db_path,
            fallback_path,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Opens the ledger; every call sees the same file.
    pub fn database(&self) -> Database {
        Database::open(&self.db_path).expect("Failed to open ledger database")
    }

    pub fn collaborators(
        &self,
        oracle: Arc<dyn ExtractionOracle>,
        sink: Option<Arc<dyn RecordSink>>,
    ) -> Collaborators {
        Collaborators {
            oracle,
            recovery: Arc::new(CannedRecovery(None)),
            triage: FixedClassifier::new(TriageLabel::Unknown),
            sink,
            fallback: Some(CsvFallback::new(&self.fallback_path)),
        }
    }

    pub fn pipeline(&self, config: &TriageConfig, collaborators: Collaborators) -> Pipeline {
        Pipeline::with_collaborators(config, self.database(), collaborators)
            .expect("Failed to build pipeline")
    }

    pub async fn run(&self, pipeline: &Pipeline, messages: Vec<Message>) -> RunManifest {
        self.run_source(pipeline, &MemoryMailSource::new(messages))
            .await
    }

    pub async fn run_source(&self, pipeline: &Pipeline, source: &dyn MailSource) -> RunManifest {
        pipeline
            .run_at(source, run_clock(), &NoopProgress)
            .await
            .expect("Run failed")
    }

    /// Fallback CSV rows keyed by column name.
    pub fn fallback_rows(&self) -> Vec<HashMap<String, String>> {
        if !self.fallback_path.exists() {
            return vec![];
        }
        let mut reader =
            csv::Reader::from_path(&self.fallback_path).expect("Failed to open fallback CSV");
        reader
            .deserialize::<HashMap<String, String>>()
            .map(|r| r.expect("Malformed fallback row"))
            .collect()
    }
}
