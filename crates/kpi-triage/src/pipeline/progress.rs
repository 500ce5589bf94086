use crate::ledger::Disposition;

/// Events emitted while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Fetched {
        messages: usize,
        skipped: usize,
    },
    LedgerFiltered {
        pending: usize,
        already_processed: usize,
    },
    MessageProcessed {
        message_id: String,
        disposition: Option<Disposition>,
    },
    SinkWritten {
        appended: usize,
        fallback: usize,
        failed: usize,
    },
    Triaged {
        count: usize,
    },
    Completed {
        run_id: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for tests and library callers without a UI.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards events to the log at info level.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Fetched { messages, skipped } => {
                tracing::info!(messages, skipped, "Fetched mail batch")
            }
            ProgressEvent::LedgerFiltered {
                pending,
                already_processed,
            } => tracing::info!(pending, already_processed, "Ledger filter applied"),
            ProgressEvent::MessageProcessed { disposition, .. } => {
                tracing::debug!(
                    disposition = disposition.map(|d| d.as_str()).unwrap_or("pending"),
                    "Message processed"
                )
            }
            ProgressEvent::SinkWritten {
                appended,
                fallback,
                failed,
            } => tracing::info!(appended, fallback, failed, "Records written"),
            ProgressEvent::Triaged { count } => tracing::info!(count, "Quarantine triaged"),
            ProgressEvent::Completed { run_id } => tracing::info!(run_id = %run_id, "Run completed"),
        }
    }
}
