//! Batched delivery with backoff, halving and a local fallback.
//!
//! Each batch gets `max_attempts` tries against the primary sink while it
//! reports rate limits or transient unavailability. A batch that exhausts its
//! budget is halved (up to `max_split_depth` times) and each half retried with
//! a fresh budget. Whatever is still undelivered is written to the fallback
//! file. A permanent failure skips retries and halving.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::Instrument;

use crate::config::schema::SinkConfig;

use super::csv_file::CsvFallback;
use super::row::SinkRow;
use super::{AppendOutcome, RecordSink};

const JITTER_MAX_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: u32,
    pub jitter: bool,
}

impl BackoffPolicy {
    pub fn from_config(config: &SinkConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_backoff_ms),
            max: Duration::from_millis(config.max_backoff_ms),
            max_attempts: config.max_attempts.max(1),
            jitter: config.jitter,
        }
    }

    /// Base delay after the failed attempt `attempt` (0-based), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter {
            base + Duration::from_millis(rand::thread_rng().gen_range(0..=JITTER_MAX_MS))
        } else {
            base
        }
    }
}

/// Where one input row ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Sink,
    Fallback,
    Failed,
}

impl Delivery {
    /// Durably written somewhere.
    pub fn is_durable(&self) -> bool {
        !matches!(self, Delivery::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteReport {
    pub submitted: usize,
    pub appended: usize,
    pub fallback_rows: usize,
    pub failed_rows: usize,
    pub batches: usize,
    pub retries: usize,
    pub splits: usize,
    /// Appends whose acknowledged row count differed from the rows sent.
    pub short_writes: usize,
    /// One entry per input row, in input order.
    pub deliveries: Vec<Delivery>,
}

impl WriteReport {
    /// Every submitted row is accounted for exactly once.
    pub fn is_balanced(&self) -> bool {
        self.appended + self.fallback_rows + self.failed_rows == self.submitted
            && self.deliveries.len() == self.submitted
    }
}

struct Chunk {
    start: usize,
    end: usize,
    depth: u32,
}

/// Result of retrying one chunk; `from` is the first row still undelivered.
enum Attempted {
    Delivered,
    /// Retry budget spent on transient failures.
    Exhausted { from: usize, reason: String },
    Permanent { from: usize, reason: String },
}

pub struct BatchWriter {
    primary: Option<Arc<dyn RecordSink>>,
    fallback: Option<CsvFallback>,
    batch_size: usize,
    policy: BackoffPolicy,
    max_split_depth: u32,
    write_timeout: Duration,
}

impl BatchWriter {
    pub fn new(
        primary: Option<Arc<dyn RecordSink>>,
        fallback: Option<CsvFallback>,
        config: &SinkConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            batch_size: config.batch_size.max(1),
            policy: BackoffPolicy::from_config(config),
            max_split_depth: config.max_split_depth,
            write_timeout: Duration::from_secs(config.write_timeout_secs),
        }
    }

    pub fn from_config(config: &SinkConfig) -> Self {
        Self::new(
            super::from_config(config),
            Some(CsvFallback::new(&config.fallback_path)),
            config,
        )
    }

    pub async fn write(&self, rows: &[SinkRow]) -> WriteReport {
        let span = tracing::info_span!("sink_write", rows = rows.len());
        self.write_inner(rows).instrument(span).await
    }

    async fn write_inner(&self, rows: &[SinkRow]) -> WriteReport {
        let mut report = WriteReport {
            submitted: rows.len(),
            deliveries: vec![Delivery::Failed; rows.len()],
            ..WriteReport::default()
        };

        let mut start = 0;
        while start < rows.len() {
            let end = (start + self.batch_size).min(rows.len());
            report.batches += 1;
            self.deliver_batch(rows, start, end, &mut report).await;
            start = end;
        }

        report.appended = count(&report.deliveries, Delivery::Sink);
        report.fallback_rows = count(&report.deliveries, Delivery::Fallback);
        report.failed_rows = count(&report.deliveries, Delivery::Failed);
        tracing::info!(
            appended = report.appended,
            fallback = report.fallback_rows,
            failed = report.failed_rows,
            retries = report.retries,
            splits = report.splits,
            "Sink write complete"
        );
        report
    }

    async fn deliver_batch(&self, rows: &[SinkRow], start: usize, end: usize, report: &mut WriteReport) {
        let Some(primary) = &self.primary else {
            self.fall_back(rows, start, end, "no primary sink configured", report);
            return;
        };

        // Stack of pending chunks; halves are pushed in reverse so the first
        // half is attempted first.
        let mut pending = vec![Chunk { start, end, depth: 0 }];
        while let Some(chunk) = pending.pop() {
            match self.attempt(primary.as_ref(), rows, chunk.start, chunk.end, report).await {
                Attempted::Delivered => {}
                Attempted::Exhausted { from, reason }
                    if chunk.depth < self.max_split_depth && chunk.end - from > 1 =>
                {
                    let mid = from + (chunk.end - from) / 2;
                    tracing::warn!(
                        rows = chunk.end - from,
                        first = mid - from,
                        second = chunk.end - mid,
                        reason = %reason,
                        "Retry budget exhausted; splitting batch"
                    );
                    report.splits += 1;
                    pending.push(Chunk {
                        start: mid,
                        end: chunk.end,
                        depth: chunk.depth + 1,
                    });
                    pending.push(Chunk {
                        start: from,
                        end: mid,
                        depth: chunk.depth + 1,
                    });
                }
                Attempted::Exhausted { from, reason } | Attempted::Permanent { from, reason } => {
                    self.fall_back(rows, from, chunk.end, &reason, report);
                }
            }
        }
    }

    /// Retries `rows[start..end]` against the sink. Rows count as delivered
    /// only once acknowledged; after a short acknowledgement the leading
    /// acknowledged rows are kept and the rest is retried after a backoff.
    async fn attempt(
        &self,
        sink: &dyn RecordSink,
        rows: &[SinkRow],
        start: usize,
        end: usize,
        report: &mut WriteReport,
    ) -> Attempted {
        let mut from = start;
        let mut last_reason = String::new();
        for attempt in 0..self.policy.max_attempts {
            let slice = &rows[from..end];
            let outcome = match tokio::time::timeout(self.write_timeout, sink.append(slice)).await {
                Ok(outcome) => outcome,
                Err(_) => AppendOutcome::Unavailable(format!(
                    "write timed out after {:?}",
                    self.write_timeout
                )),
            };
            let wait = match outcome {
                AppendOutcome::Appended { rows: acknowledged } if acknowledged >= slice.len() => {
                    if acknowledged > slice.len() {
                        tracing::warn!(
                            sent = slice.len(),
                            acknowledged,
                            sink = sink.name(),
                            "Sink acknowledged more rows than sent"
                        );
                    }
                    mark(&mut report.deliveries[from..end], Delivery::Sink);
                    return Attempted::Delivered;
                }
                AppendOutcome::Appended { rows: acknowledged } => {
                    report.short_writes += 1;
                    tracing::error!(
                        sent = slice.len(),
                        acknowledged,
                        sink = sink.name(),
                        "Sink acknowledged fewer rows than sent"
                    );
                    mark(&mut report.deliveries[from..from + acknowledged], Delivery::Sink);
                    from += acknowledged;
                    last_reason = format!(
                        "sink acknowledged {} of {} rows",
                        acknowledged,
                        slice.len()
                    );
                    self.policy.delay(attempt)
                }
                AppendOutcome::Failed(reason) => {
                    tracing::error!(sink = sink.name(), reason = %reason, "Sink rejected batch");
                    return Attempted::Permanent { from, reason };
                }
                AppendOutcome::RateLimited { retry_after } => {
                    last_reason = "rate limited".to_string();
                    retry_after.unwrap_or_else(|| self.policy.delay(attempt))
                }
                AppendOutcome::Unavailable(reason) => {
                    last_reason = reason;
                    self.policy.delay(attempt)
                }
            };
            if attempt + 1 < self.policy.max_attempts {
                tracing::warn!(
                    sink = sink.name(),
                    attempt = attempt + 1,
                    max_attempts = self.policy.max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    reason = %last_reason,
                    "Sink write failed; backing off"
                );
                report.retries += 1;
                tokio::time::sleep(wait).await;
            }
        }
        Attempted::Exhausted {
            from,
            reason: last_reason,
        }
    }

    fn fall_back(&self, rows: &[SinkRow], start: usize, end: usize, reason: &str, report: &mut WriteReport) {
        let Some(fallback) = &self.fallback else {
            tracing::error!(rows = end - start, reason = %reason, "No fallback configured; rows lost");
            return;
        };
        match fallback.write(&rows[start..end]) {
            Ok(_) => {
                tracing::warn!(rows = end - start, reason = %reason, "Rows written to local fallback");
                mark(&mut report.deliveries[start..end], Delivery::Fallback);
            }
            Err(e) => {
                tracing::error!(rows = end - start, error = %e, "Fallback write failed");
            }
        }
    }
}

fn mark(deliveries: &mut [Delivery], kind: Delivery) {
    for d in deliveries {
        *d = kind;
    }
}

fn count(deliveries: &[Delivery], kind: Delivery) -> usize {
    deliveries.iter().filter(|d| **d == kind).count()
}
