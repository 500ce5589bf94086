use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tracing::{info_span, Instrument};

use crate::config::{prepare_config, TriageConfig};
use crate::db::{run_repo, Database};
use crate::document::{decode_attachment, Document};
use crate::extract::{KpiExtractor, OracleStatus};
use crate::ledger::{AuditInfo, Disposition, Ledger};
use crate::mail::{FetchWindow, MailSource};
use crate::matching::{MatchOutcome, SourceMatcher};
use crate::message::Message;
use crate::oracle::{self, ExtractionOracle};
use crate::quarantine::{classifier_from_settings, QuarantineTriage, TriageClassifier};
use crate::recovery::{self, TextRecovery};
use crate::sanitize;
use crate::scoring::{Candidate, CandidateScorer};
use crate::sink::{self, BatchWriter, CsvFallback, Delivery, RecordSink, RowContext, SinkRow};
use crate::suitability::{assess_document, SuitabilityClassifier};
use crate::validate::{ValidationOutcome, Validator};

use super::config::PipelineConfig;
use super::context::{PipelineContext, Stage};
use super::error::{FailureCategory, MessageIssue, PipelineError};
use super::manifest::{MessageOutcome, RunManifest};
use super::progress::{ProgressEvent, ProgressReporter};

/// Optional external services, each behind a capability interface.
pub struct Collaborators {
    pub oracle: Arc<dyn ExtractionOracle>,
    pub recovery: Arc<dyn TextRecovery>,
    pub triage: Arc<dyn TriageClassifier>,
    pub sink: Option<Arc<dyn RecordSink>>,
    pub fallback: Option<CsvFallback>,
}

impl Collaborators {
    pub fn from_config(config: &TriageConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            oracle: oracle::from_config(&config.extraction.oracle)?,
            recovery: recovery::from_config(&config.recovery),
            triage: classifier_from_settings(&config.triage),
            sink: sink::from_config(&config.sink),
            fallback: Some(CsvFallback::new(&config.sink.fallback_path)),
        })
    }
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    scorer: CandidateScorer,
    matcher: SourceMatcher,
    classifier: SuitabilityClassifier,
    recovery: Arc<dyn TextRecovery>,
    extractor: KpiExtractor,
    validator: Validator,
    triage: QuarantineTriage,
    writer: BatchWriter,
    db: Database,
}

impl Pipeline {
    /// Production constructor: builds every collaborator from config.
    pub fn from_config(config: &TriageConfig, db: Database) -> Result<Self, PipelineError> {
        let collaborators = Collaborators::from_config(config)?;
        Self::with_collaborators(config, db, collaborators)
    }

    /// Builds the deterministic stages from config around the given
    /// collaborators. An invalid rule set fails here, before any run.
    pub fn with_collaborators(
        config: &TriageConfig,
        db: Database,
        collaborators: Collaborators,
    ) -> Result<Self, PipelineError> {
        let config = prepare_config(config.clone())?;
        Ok(Self {
            config: Arc::new(PipelineConfig::from_config(&config)),
            scorer: CandidateScorer::new(&config.scoring)?,
            matcher: SourceMatcher::new(&config.matching)?,
            classifier: SuitabilityClassifier::new(&config.suitability),
            recovery: collaborators.recovery,
            extractor: KpiExtractor::new(&config.extraction, &config.labels, collaborators.oracle)?,
            validator: Validator::new(&config.entities, &config.validation),
            triage: QuarantineTriage::new(collaborators.triage, &config.triage, Some(db.clone())),
            writer: BatchWriter::new(collaborators.sink, collaborators.fallback, &config.sink),
            db,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(
        &self,
        source: &dyn MailSource,
        progress: &dyn ProgressReporter,
    ) -> Result<RunManifest, PipelineError> {
        self.run_at(source, Utc::now(), progress).await
    }

    /// Runs one batch for the lookback window ending at `now`.
    pub async fn run_at(
        &self,
        source: &dyn MailSource,
        now: DateTime<Utc>,
        progress: &dyn ProgressReporter,
    ) -> Result<RunManifest, PipelineError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("pipeline",
            run_id = %run_id,
            config_version = %self.config.config_version,
            config_fingerprint = %self.config.config_fingerprint,
        );
        self.run_inner(source, now, run_id, progress)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        source: &dyn MailSource,
        now: DateTime<Utc>,
        run_id: String,
        progress: &dyn ProgressReporter,
    ) -> Result<RunManifest, PipelineError> {
        let mut manifest = RunManifest::new(
            &run_id,
            Utc::now(),
            &self.config.config_version,
            &self.config.config_fingerprint,
        );
        tracing::info!(
            lookback_days = self.config.lookback_days,
            folders = ?self.config.folders,
            "Run started"
        );

        // Fetch
        let window = FetchWindow::lookback(now, self.config.lookback_days);
        let batch = source.fetch(&window, &self.config.folders).await?;
        manifest.counts.scanned = batch.messages.len() + batch.skipped.len();
        manifest.count_failure(FailureCategory::InputDefect, batch.skipped.len());
        progress.report(ProgressEvent::Fetched {
            messages: batch.messages.len(),
            skipped: batch.skipped.len(),
        });

        let mut seen = HashSet::new();
        let mut messages: Vec<Message> = Vec::with_capacity(batch.messages.len());
        for message in batch.messages {
            if seen.insert(message.id.clone()) {
                messages.push(message);
            } else {
                manifest.counts.duplicates += 1;
                tracing::warn!(id = %sanitize::hash_id(&message.id), "Duplicate message id in batch");
            }
        }

        // Ledger filter
        let ledger = Ledger::for_run(self.db.clone(), &run_id);
        let pending: HashSet<String> = {
            let _step = info_span!("ledger_filter").entered();
            ledger
                .filter_unprocessed(messages.iter().map(|m| m.id.clone()).collect())?
                .into_iter()
                .collect()
        };
        let fetched = messages.len();
        messages.retain(|m| pending.contains(&m.id));
        manifest.counts.skipped_ledger = fetched - messages.len();
        progress.report(ProgressEvent::LedgerFiltered {
            pending: messages.len(),
            already_processed: manifest.counts.skipped_ledger,
        });

        // Per-message stages, order preserved
        let contexts: Vec<PipelineContext> = stream::iter(messages)
            .map(|message| self.process_message(message))
            .buffered(self.config.concurrency)
            .collect()
            .await;

        // Immediate dispositions and rows for the sink
        let mut rows: Vec<SinkRow> = Vec::new();
        let mut row_owner: Vec<usize> = Vec::new();
        for (i, ctx) in contexts.iter().enumerate() {
            self.tally(&mut manifest, ctx);
            let disposition = ctx.stage.immediate_disposition();
            if let Some(d) = disposition {
                ledger.record(ctx.message_id(), d, audit(ctx))?;
                progress.report(ProgressEvent::MessageProcessed {
                    message_id: ctx.message_id().to_string(),
                    disposition: Some(d),
                });
            } else if let Some(extraction) = &ctx.extraction {
                let reasons = ctx.candidate.score.reasons_summary();
                let row_ctx = RowContext {
                    run_id: &run_id,
                    sender: sender_label(&ctx.candidate.message),
                    subject: &ctx.candidate.message.subject,
                    candidate_score: ctx.candidate.score.score,
                    candidate_reasons: &reasons,
                    extractor_version: &self.config.extractor_version,
                };
                rows.push(SinkRow::from_record(&extraction.record, &row_ctx));
                row_owner.push(i);
            }
            manifest.messages.push(outcome_of(ctx, disposition));
        }

        // Sink write; extracted messages are committed only once durable
        if !rows.is_empty() {
            let report = self.writer.write(&rows).await;
            for (row_index, delivery) in report.deliveries.iter().enumerate() {
                let i = row_owner[row_index];
                let ctx = &contexts[i];
                if delivery.is_durable() {
                    ledger.record(ctx.message_id(), Disposition::Extracted, audit(ctx))?;
                    manifest.counts.extracted += 1;
                    manifest.messages[i].disposition = Some(Disposition::Extracted);
                    manifest.messages[i].detail = Some(match delivery {
                        Delivery::Sink => "written to sink".to_string(),
                        _ => "written to local fallback".to_string(),
                    });
                    progress.report(ProgressEvent::MessageProcessed {
                        message_id: ctx.message_id().to_string(),
                        disposition: Some(Disposition::Extracted),
                    });
                } else {
                    manifest.count_failure(FailureCategory::SinkFailure, 1);
                    manifest.messages[i].detail =
                        Some("sink and fallback unavailable; retried next run".to_string());
                    manifest.messages[i].issues.push(MessageIssue::new(
                        FailureCategory::SinkFailure,
                        "record not written",
                    ));
                }
            }
            manifest.counts.appended = report.appended;
            manifest.counts.fallback_rows = report.fallback_rows;
            if !report.is_balanced() {
                tracing::error!(?report, "Sink report does not account for every row");
            }
            progress.report(ProgressEvent::SinkWritten {
                appended: report.appended,
                fallback: report.fallback_rows,
                failed: report.failed_rows,
            });
        }

        // Quarantine triage
        let quarantined: Vec<&Candidate> = contexts
            .iter()
            .filter(|c| c.stage == Stage::Quarantined)
            .map(|c| &c.candidate)
            .collect();
        if !quarantined.is_empty() {
            let (results, summary) = self
                .triage
                .triage_batch(&quarantined)
                .instrument(info_span!("triage"))
                .await;
            let index: HashMap<&str, usize> = manifest
                .messages
                .iter()
                .enumerate()
                .map(|(i, m)| (m.message_id.as_str(), i))
                .collect();
            let mut labelled = Vec::with_capacity(results.len());
            for (id, result) in &results {
                if let Some(&i) = index.get(id.as_str()) {
                    labelled.push((i, format!("triage: {}", result.label)));
                }
            }
            for (i, detail) in labelled {
                manifest.messages[i].detail = Some(detail);
            }
            manifest.count_failure(FailureCategory::CollaboratorFailure, summary.failed);
            manifest.counts.triaged = summary.triaged;
            progress.report(ProgressEvent::Triaged {
                count: summary.triaged,
            });
            manifest.triage = summary;
        }

        manifest.finished_at = Some(Utc::now());
        self.record_run(&manifest)?;
        tracing::info!(
            scanned = manifest.counts.scanned,
            extracted = manifest.counts.extracted,
            quarantined = manifest.counts.quarantined,
            rejected = manifest.counts.rejected,
            failures = ?manifest.failures,
            "Run finished"
        );
        progress.report(ProgressEvent::Completed {
            run_id: run_id.clone(),
        });
        Ok(manifest)
    }

    fn tally(&self, manifest: &mut RunManifest, ctx: &PipelineContext) {
        let counts = &mut manifest.counts;
        if ctx.candidate.score.admitted {
            counts.candidates += 1;
        }
        match ctx.stage {
            Stage::Rejected => counts.rejected += 1,
            Stage::Quarantined => counts.quarantined += 1,
            Stage::Unsuitable => counts.unsuitable += 1,
            Stage::Dropped => counts.dropped += 1,
            Stage::AwaitingSink => {}
        }
        if ctx.source.is_some() {
            counts.matched += 1;
        }
        if matches!(ctx.validation, Some(ValidationOutcome::Flag { .. })) {
            counts.flagged += 1;
        }
        for issue in &ctx.issues {
            manifest.count_failure(issue.category, 1);
        }
    }

    fn record_run(&self, manifest: &RunManifest) -> Result<(), PipelineError> {
        let json = match manifest.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize run manifest");
                return Ok(());
            }
        };
        run_repo::insert(
            &self.db,
            &run_repo::RunRow {
                run_id: manifest.run_id.clone(),
                started_at: manifest.started_at.to_rfc3339(),
                finished_at: manifest
                    .finished_at
                    .unwrap_or_else(Utc::now)
                    .to_rfc3339(),
                manifest: json,
            },
        )?;
        Ok(())
    }

    async fn process_message(&self, message: Message) -> PipelineContext {
        let span = info_span!("message", id = %sanitize::hash_id(&message.id));
        self.process_inner(message).instrument(span).await
    }

    async fn process_inner(&self, message: Message) -> PipelineContext {
        // Step 1: Score
        let mut ctx = self.step_score(message);
        if !ctx.candidate.score.admitted {
            ctx.stage = Stage::Rejected;
            return ctx;
        }

        // Step 2: Match source
        if !self.step_match(&mut ctx) {
            ctx.stage = Stage::Quarantined;
            return ctx;
        }

        // Step 3: Classify documents
        self.step_classify(&mut ctx)
            .instrument(info_span!("classify"))
            .await;
        if !ctx.assessed.iter().any(|a| a.verdict.tier.is_extractable()) {
            ctx.stage = Stage::Unsuitable;
            return ctx;
        }

        // Step 4: Extract
        self.step_extract(&mut ctx)
            .instrument(info_span!("extract"))
            .await;

        // Step 5: Validate
        self.step_validate(&mut ctx);
        ctx
    }

    fn step_score(&self, message: Message) -> PipelineContext {
        let _step = info_span!("score_candidate").entered();
        let mut ctx = PipelineContext::new(self.scorer.evaluate(message));
        let sender = &ctx.candidate.message.sender;
        if !sender.is_resolved() {
            let detail = format!("unresolved sender identifier '{}'", sender.raw);
            tracing::warn!(
                sender = %sanitize::truncate_snippet(&sender.raw, 40),
                "Sender could not be resolved"
            );
            ctx.issue(FailureCategory::InputDefect, detail);
        }
        tracing::debug!(
            score = ctx.candidate.score.score,
            admitted = ctx.candidate.score.admitted,
            reasons = %ctx.candidate.score.reasons_summary(),
            "Scored"
        );
        ctx
    }

    /// Returns false when the candidate is quarantined.
    fn step_match(&self, ctx: &mut PipelineContext) -> bool {
        let _step = info_span!(
            "match_source",
            sender = %sanitize::mask_address(&ctx.candidate.message.sender.address)
        )
        .entered();
        match self.matcher.match_candidate(&ctx.candidate) {
            MatchOutcome::Matched(found) => {
                ctx.source = Some(found);
                true
            }
            MatchOutcome::Quarantined { top_scores } => {
                ctx.top_scores = top_scores;
                false
            }
        }
    }

    async fn step_classify(&self, ctx: &mut PipelineContext) {
        let message = &ctx.candidate.message;
        let as_of = message.received_at.date_naive();
        let mut documents: Vec<Document> = Vec::new();
        let mut issues: Vec<MessageIssue> = Vec::new();
        for attachment in self.scorer.gate().relevant(message) {
            match decode_attachment(attachment) {
                Ok(document) => documents.extend(document.split_sheets()),
                Err(e) => {
                    tracing::warn!(attachment = %attachment.filename, error = %e, "Skipping undecodable attachment");
                    issues.push(MessageIssue::new(
                        FailureCategory::InputDefect,
                        format!("{}: {}", attachment.filename, e),
                    ));
                }
            }
        }
        if !message.body.trim().is_empty() {
            documents.push(Document::body(message.body.clone()));
        }

        for document in documents {
            let assessed = assess_document(
                &self.classifier,
                self.recovery.as_ref(),
                self.config.recovery_timeout,
                document,
                as_of,
            )
            .await;
            if let Some(reason) = &assessed.recovery_unavailable {
                issues.push(MessageIssue::new(
                    FailureCategory::CollaboratorFailure,
                    format!("text recovery unavailable for {}: {}", assessed.verdict.document, reason),
                ));
            }
            tracing::debug!(
                document = %assessed.verdict.document,
                tier = %assessed.verdict.tier,
                score = assessed.verdict.score,
                "Classified"
            );
            ctx.assessed.push(assessed);
        }
        ctx.issues.extend(issues);
    }

    async fn step_extract(&self, ctx: &mut PipelineContext) {
        let Some(source) = &ctx.source else {
            return;
        };
        let outcome = self
            .extractor
            .extract(&ctx.candidate.message, source, &ctx.assessed)
            .await;
        for part in &outcome.documents {
            if let OracleStatus::Unavailable(reason) = &part.oracle_status {
                ctx.issues.push(MessageIssue::new(
                    FailureCategory::CollaboratorFailure,
                    format!("oracle unavailable for {}: {}", part.document, reason),
                ));
            }
        }
        ctx.extraction = Some(outcome);
    }

    fn step_validate(&self, ctx: &mut PipelineContext) {
        let _step = info_span!("validate").entered();
        let relaxed = ctx.source.as_ref().is_some_and(|s| s.relaxed);
        let Some(extraction) = ctx.extraction.as_mut() else {
            ctx.stage = Stage::Unsuitable;
            return;
        };
        let outcome = self.validator.validate(&extraction.record, relaxed);
        match &outcome {
            ValidationOutcome::Drop { reason } => {
                tracing::info!(reason = %reason, "Record dropped");
                ctx.stage = Stage::Dropped;
            }
            ValidationOutcome::Flag { flags } => {
                extraction.record.flags.extend(flags.iter().cloned());
                for flag in flags.iter().filter(|f| f.field.is_some()) {
                    ctx.issues.push(MessageIssue::new(
                        FailureCategory::DataQuality,
                        format!("{}: {}", flag.label(), flag.detail),
                    ));
                }
                ctx.stage = Stage::AwaitingSink;
            }
            ValidationOutcome::Accept => ctx.stage = Stage::AwaitingSink,
        }
        ctx.validation = Some(outcome);
    }
}

fn sender_label(message: &Message) -> &str {
    if message.sender.address.is_empty() {
        &message.sender.raw
    } else {
        &message.sender.address
    }
}

fn audit(ctx: &PipelineContext) -> AuditInfo {
    let message = &ctx.candidate.message;
    AuditInfo {
        entity: ctx.source.as_ref().map(|s| s.entity.clone()),
        sender: Some(sender_label(message).to_string()),
        subject: Some(message.subject.clone()),
        folder: Some(message.folder.clone()),
    }
}

fn outcome_of(ctx: &PipelineContext, disposition: Option<Disposition>) -> MessageOutcome {
    let detail = match (&ctx.stage, &ctx.validation) {
        (Stage::Rejected, _) => Some(ctx.candidate.score.reasons_summary()),
        (Stage::Quarantined, _) => ctx
            .top_scores
            .first()
            .map(|s| format!("best rule {} at {:.2}", s.rule, s.score)),
        (Stage::Unsuitable, _) => Some("no tier 1 or tier 2 document".to_string()),
        (Stage::Dropped, Some(ValidationOutcome::Drop { reason })) => Some(reason.clone()),
        _ => None,
    };
    MessageOutcome {
        message_id: ctx.message_id().to_string(),
        disposition,
        score: ctx.candidate.score.score,
        entity: ctx.source.as_ref().map(|s| s.entity.clone()),
        detail,
        issues: ctx.issues.clone(),
    }
}
