//! Record sink boundary and the batching writer in front of it.

pub mod csv_file;
pub mod row;
pub mod writer;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::schema::SinkConfig;

pub use csv_file::{CsvFallback, CsvFileSink};
pub use row::{RowContext, SinkRow, COLUMN_ORDER};
pub use writer::{BackoffPolicy, BatchWriter, Delivery, WriteReport};

/// Result of one append call. Every variant is an ordinary value; sinks never
/// signal failure by panicking or returning early through `?`.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// `rows` leading rows of the call were stored. Fewer than sent means
    /// the remainder was not written and is retried.
    Appended { rows: usize },
    /// Retry after backing off; `retry_after` overrides the computed delay.
    RateLimited { retry_after: Option<Duration> },
    /// Transient failure worth retrying.
    Unavailable(String),
    /// Permanent failure; the rows go straight to the fallback.
    Failed(String),
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    fn name(&self) -> &str;

    async fn append(&self, rows: &[SinkRow]) -> AppendOutcome;
}

/// Builds the configured primary sink, if any.
pub fn from_config(config: &SinkConfig) -> Option<Arc<dyn RecordSink>> {
    config
        .csv_path
        .as_ref()
        .map(|path| Arc::new(CsvFileSink::new(path)) as Arc<dyn RecordSink>)
}
