pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod extract;
pub mod kpi;
pub mod ledger;
pub mod llm;
pub mod mail;
pub mod matching;
pub mod message;
pub mod oracle;
pub mod pipeline;
pub mod quarantine;
pub mod recovery;
pub mod sanitize;
pub mod scoring;
pub mod secrets;
pub mod sink;
pub mod suitability;
pub mod telemetry;
pub mod text;
pub mod validate;

pub use config::{load_config, load_config_from_str, TriageConfig};
pub use error::{CollaboratorError, ConfigError, DecodeError, Result, SinkError, TriageError};
pub use kpi::{ExtractionSource, KpiField, KpiRecord, KpiValue, ValidationFlag};
pub use ledger::{Disposition, Ledger};
pub use mail::{EmlDirectorySource, MailSource, MemoryMailSource};
pub use message::{Attachment, Message, SenderResolution};
pub use pipeline::{Collaborators, Pipeline, PipelineConfig, RunManifest};
pub use sink::{BatchWriter, CsvFallback, RecordSink};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
