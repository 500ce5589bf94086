use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::defaults;
use crate::kpi::KpiField;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub suitability: SuitabilityConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    /// Required-field sets keyed by entity id.
    #[serde(default)]
    pub entities: BTreeMap<String, EntityRules>,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub triage: TriageSettings,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

fn default_version() -> String {
    "1".to_string()
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            run: RunConfig::default(),
            mail: MailConfig::default(),
            scoring: ScoringConfig::default(),
            matching: MatchingConfig::default(),
            suitability: SuitabilityConfig::default(),
            labels: LabelConfig::default(),
            entities: BTreeMap::new(),
            extraction: ExtractionConfig::default(),
            recovery: RecoveryConfig::default(),
            validation: ValidationConfig::default(),
            triage: TriageSettings::default(),
            sink: SinkConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "defaults::folders")]
    pub folders: Vec<String>,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Messages processed concurrently. Output order is always input order.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_lookback_days() -> u32 {
    7
}

fn default_concurrency() -> usize {
    num_cpus::get()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            folders: defaults::folders(),
            lookback_days: default_lookback_days(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailConfig {
    /// Directory alias (lower-cased CN) to SMTP address.
    #[serde(default)]
    pub sender_directory: BTreeMap<String, String>,
    /// Directory of `.eml` files for the file-based mail source.
    #[serde(default)]
    pub eml_directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_admission_threshold")]
    pub admission_threshold: i32,
    #[serde(default)]
    pub trusted_senders: Vec<String>,
    #[serde(default)]
    pub trusted_domains: Vec<String>,
    #[serde(default)]
    pub deny_domains: Vec<String>,
    /// Line-list files merged into the lists above at load time.
    #[serde(default)]
    pub trusted_senders_file: Option<String>,
    #[serde(default)]
    pub trusted_domains_file: Option<String>,
    #[serde(default)]
    pub deny_domains_file: Option<String>,
    #[serde(default = "defaults::subject_patterns")]
    pub subject_patterns: Vec<String>,
    #[serde(default = "defaults::body_kpi_keywords")]
    pub body_kpi_keywords: Vec<String>,
    #[serde(default = "defaults::meeting_patterns")]
    pub meeting_patterns: Vec<String>,
    #[serde(default = "defaults::newsletter_markers")]
    pub newsletter_markers: Vec<String>,
    #[serde(default = "defaults::newsletter_local_parts")]
    pub newsletter_local_parts: Vec<String>,
    #[serde(default = "defaults::quarantine_digest_patterns")]
    pub quarantine_digest_patterns: Vec<String>,
    #[serde(default = "defaults::report_extensions")]
    pub report_extensions: Vec<String>,
    #[serde(default = "defaults::filename_keywords")]
    pub filename_keywords: Vec<String>,
    #[serde(default = "defaults::noise_filename_patterns")]
    pub noise_filename_patterns: Vec<String>,
    /// Per-folder score adjustment, keyed by lower-cased folder name.
    #[serde(default)]
    pub folder_bonus: BTreeMap<String, i32>,
    #[serde(default = "default_body_scan_chars")]
    pub body_scan_chars: usize,
    #[serde(default)]
    pub weights: SignalWeights,
}

fn default_admission_threshold() -> i32 {
    3
}

fn default_body_scan_chars() -> usize {
    3000
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            admission_threshold: default_admission_threshold(),
            trusted_senders: Vec::new(),
            trusted_domains: Vec::new(),
            deny_domains: Vec::new(),
            trusted_senders_file: None,
            trusted_domains_file: None,
            deny_domains_file: None,
            subject_patterns: defaults::subject_patterns(),
            body_kpi_keywords: defaults::body_kpi_keywords(),
            meeting_patterns: defaults::meeting_patterns(),
            newsletter_markers: defaults::newsletter_markers(),
            newsletter_local_parts: defaults::newsletter_local_parts(),
            quarantine_digest_patterns: defaults::quarantine_digest_patterns(),
            report_extensions: defaults::report_extensions(),
            filename_keywords: defaults::filename_keywords(),
            noise_filename_patterns: defaults::noise_filename_patterns(),
            folder_bonus: BTreeMap::new(),
            body_scan_chars: default_body_scan_chars(),
            weights: SignalWeights::default(),
        }
    }
}

/// Candidate signal weights. The last three are off unless configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalWeights {
    #[serde(default = "w_trusted_sender")]
    pub trusted_sender: i32,
    #[serde(default = "w_trusted_domain")]
    pub trusted_domain: i32,
    #[serde(default = "w_subject")]
    pub subject: i32,
    #[serde(default = "w_body_signature")]
    pub body_signature: i32,
    #[serde(default = "w_deny_domain")]
    pub deny_domain: i32,
    #[serde(default = "w_meeting")]
    pub meeting: i32,
    #[serde(default = "w_newsletter")]
    pub newsletter: i32,
    #[serde(default)]
    pub quarantine_digest: i32,
    #[serde(default)]
    pub report_attachment: i32,
    #[serde(default)]
    pub filename_keyword: i32,
}

fn w_trusted_sender() -> i32 {
    3
}
fn w_trusted_domain() -> i32 {
    2
}
fn w_subject() -> i32 {
    2
}
fn w_body_signature() -> i32 {
    2
}
fn w_deny_domain() -> i32 {
    -5
}
fn w_meeting() -> i32 {
    -3
}
fn w_newsletter() -> i32 {
    -3
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            trusted_sender: w_trusted_sender(),
            trusted_domain: w_trusted_domain(),
            subject: w_subject(),
            body_signature: w_body_signature(),
            deny_domain: w_deny_domain(),
            meeting: w_meeting(),
            newsletter: w_newsletter(),
            quarantine_digest: 0,
            report_attachment: 0,
            filename_keyword: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_match_threshold")]
    pub default_threshold: f64,
    #[serde(default)]
    pub sources: Vec<SourceRule>,
    /// What to do with unmatched candidates from generally trusted domains.
    #[serde(default)]
    pub domain_policies: Vec<DomainPolicy>,
}

fn default_match_threshold() -> f64 {
    0.45
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_threshold: default_match_threshold(),
            sources: Vec::new(),
            domain_policies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRule {
    pub name: String,
    pub entity: String,
    #[serde(default = "default_report_type")]
    pub report_type: String,
    /// Tie-break: higher wins.
    #[serde(default)]
    pub priority: i32,
    /// Overrides the global threshold only when it is stricter.
    #[serde(default)]
    pub match_threshold: Option<f64>,
    #[serde(default = "default_confidence_weight")]
    pub confidence_weight: f64,
    #[serde(default)]
    pub from_addresses: Vec<String>,
    #[serde(default)]
    pub from_domains: Vec<String>,
    #[serde(default)]
    pub subject_patterns: Vec<String>,
    #[serde(default)]
    pub body_keywords: Vec<String>,
    /// Media types (`application/pdf`) or extensions (`xlsx`).
    #[serde(default)]
    pub attachment_types: Vec<String>,
    #[serde(default)]
    pub filename_patterns: Vec<String>,
    #[serde(default)]
    pub expected_kpis: Vec<KpiField>,
}

fn default_report_type() -> String {
    "kpi".to_string()
}

fn default_confidence_weight() -> f64 {
    1.0
}

impl SourceRule {
    pub fn has_predicates(&self) -> bool {
        !(self.from_addresses.is_empty()
            && self.from_domains.is_empty()
            && self.subject_patterns.is_empty()
            && self.body_keywords.is_empty()
            && self.attachment_types.is_empty()
            && self.filename_patterns.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainPolicy {
    pub domain: String,
    #[serde(flatten)]
    pub policy: UnmatchedPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    Quarantine,
    /// Re-run matching with a lower threshold; a match found this way is
    /// validated with the weaker requirement.
    AdmitRelaxed { threshold: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuitabilityConfig {
    #[serde(default = "defaults::time_terms")]
    pub time_terms: Vec<String>,
    #[serde(default = "defaults::kpi_label_terms")]
    pub kpi_label_terms: Vec<String>,
    #[serde(default = "defaults::total_terms")]
    pub total_terms: Vec<String>,
    #[serde(default = "defaults::hard_reject_terms")]
    pub hard_reject_terms: Vec<String>,
    #[serde(default = "defaults::sheet_accept_terms")]
    pub sheet_accept_terms: Vec<String>,
    #[serde(default = "defaults::sheet_reject_terms")]
    pub sheet_reject_terms: Vec<String>,
    #[serde(default = "defaults::report_filename_hints")]
    pub report_filename_hints: Vec<String>,
    #[serde(default = "default_recent_days")]
    pub recent_days: i64,
    /// Below this many characters a PDF counts as having no text layer.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

fn default_recent_days() -> i64 {
    7
}

fn default_min_text_chars() -> usize {
    200
}

impl Default for SuitabilityConfig {
    fn default() -> Self {
        Self {
            time_terms: defaults::time_terms(),
            kpi_label_terms: defaults::kpi_label_terms(),
            total_terms: defaults::total_terms(),
            hard_reject_terms: defaults::hard_reject_terms(),
            sheet_accept_terms: defaults::sheet_accept_terms(),
            sheet_reject_terms: defaults::sheet_reject_terms(),
            report_filename_hints: defaults::report_filename_hints(),
            recent_days: default_recent_days(),
            min_text_chars: default_min_text_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Label variants keyed by KPI field name.
    #[serde(default = "default_synonyms")]
    pub synonyms: BTreeMap<String, Vec<String>>,
}

fn default_synonyms() -> BTreeMap<String, Vec<String>> {
    defaults::synonyms()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            synonyms: default_synonyms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRules {
    #[serde(default)]
    pub required: Vec<KpiField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEndpoint {
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<LlmEndpoint>,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_excerpt_chars")]
    pub max_excerpt_chars: usize,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_oracle_timeout() -> u64 {
    30
}

fn default_excerpt_chars() -> usize {
    12_000
}

fn default_min_confidence() -> f64 {
    0.6
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            timeout_secs: default_oracle_timeout(),
            max_excerpt_chars: default_excerpt_chars(),
            min_confidence: default_min_confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default = "defaults::invoice_terms")]
    pub invoice_terms: Vec<String>,
    /// Suitability score needed before a bare amount in an invoice-like
    /// document may count as revenue.
    #[serde(default = "default_invoice_min_score")]
    pub invoice_min_score: i32,
    #[serde(default = "default_evidence_chars")]
    pub evidence_chars: usize,
    #[serde(default = "default_extractor_version")]
    pub extractor_version: String,
}

fn default_invoice_min_score() -> i32 {
    6
}

fn default_evidence_chars() -> usize {
    160
}

fn default_extractor_version() -> String {
    concat!("kpi-triage/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            invoice_terms: defaults::invoice_terms(),
            invoice_min_score: default_invoice_min_score(),
            evidence_chars: default_evidence_chars(),
            extractor_version: default_extractor_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_recovery_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_recovery_timeout() -> u64 {
    120
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_dpi() -> u32 {
    300
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: default_recovery_timeout(),
            languages: default_languages(),
            dpi: default_dpi(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Drop records whose six fields are all null.
    #[serde(default = "default_true")]
    pub require_kpi: bool,
    /// Money amounts above this are flagged as implausible.
    #[serde(default = "default_max_money")]
    pub max_money: f64,
}

fn default_true() -> bool {
    true
}

fn default_max_money() -> f64 {
    1.0e11
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            require_kpi: true,
            max_money: default_max_money(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<LlmEndpoint>,
    #[serde(default = "default_triage_max")]
    pub max_per_run: usize,
    #[serde(default = "default_triage_body_chars")]
    pub body_chars: usize,
    #[serde(default = "default_triage_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

fn default_triage_max() -> usize {
    100
}

fn default_triage_body_chars() -> usize {
    600
}

fn default_triage_delay_ms() -> u64 {
    300
}

impl Default for TriageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            max_per_run: default_triage_max(),
            body_chars: default_triage_body_chars(),
            delay_ms: default_triage_delay_ms(),
            timeout_secs: default_oracle_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Attempts per batch before it is halved.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_true")]
    pub jitter: bool,
    /// How many times a failing batch may be halved.
    #[serde(default = "default_max_split_depth")]
    pub max_split_depth: u32,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    /// Primary CSV sink path; when unset the caller supplies a sink.
    #[serde(default)]
    pub csv_path: Option<String>,
    #[serde(default = "default_fallback_path")]
    pub fallback_path: String,
}

fn default_batch_size() -> usize {
    200
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_max_split_depth() -> u32 {
    1
}

fn default_write_timeout() -> u64 {
    60
}

fn default_fallback_path() -> String {
    "kpi_fallback.csv".to_string()
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: true,
            max_split_depth: default_max_split_depth(),
            write_timeout_secs: default_write_timeout(),
            csv_path: None,
            fallback_path: default_fallback_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Defaults to `~/.kpi-triage/data/ledger.db`.
    #[serde(default)]
    pub path: Option<String>,
}
