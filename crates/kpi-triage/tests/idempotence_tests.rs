//! Cross-run behavior of the dedup ledger.

mod common;

use std::sync::Arc;

use common::*;
use kpi_triage::ledger::Ledger;
use kpi_triage::pipeline::{Collaborators, FailureCategory};
use kpi_triage::quarantine::TriageLabel;
use kpi_triage::sink::AppendOutcome;

#[tokio::test]
async fn test_second_run_over_same_mail_writes_nothing() {
    let harness = TestHarness::new();
    let config = acme_config().build();
    let sink = ScriptedSink::accepting();
    let messages = vec![
        cash_snapshot("snap-1", "45000"),
        MessageBuilder::new("promo-1")
            .from("newsletter@vendor.com")
            .subject("Deals")
            .build(),
    ];

    let first = harness.pipeline(
        &config,
        harness.collaborators(ScriptedOracle::silent(), Some(sink.clone())),
    );
    let manifest = harness.run(&first, messages.clone()).await;
    assert_eq!(manifest.counts.extracted, 1);
    assert_eq!(manifest.counts.rejected, 1);
    drop(first);

    // A fresh pipeline over the same ledger file.
    let second = harness.pipeline(
        &config,
        harness.collaborators(ScriptedOracle::silent(), Some(sink.clone())),
    );
    let manifest = harness.run(&second, messages).await;
    assert_eq!(manifest.counts.skipped_ledger, 2);
    assert!(manifest.messages.is_empty());
    assert_eq!(sink.appended(), vec!["snap-1"]);
    assert_eq!(Ledger::new(harness.database()).stats().unwrap().total, 2);
}

#[tokio::test]
async fn test_only_new_mail_is_processed() {
    let harness = TestHarness::new();
    let config = acme_config().build();
    let sink = ScriptedSink::accepting();
    let pipeline = harness.pipeline(
        &config,
        harness.collaborators(ScriptedOracle::silent(), Some(sink.clone())),
    );

    harness
        .run(&pipeline, vec![cash_snapshot("snap-1", "45000")])
        .await;
    let manifest = harness
        .run(
            &pipeline,
            vec![
                cash_snapshot("snap-1", "45000"),
                cash_snapshot("snap-2", "46000"),
            ],
        )
        .await;

    assert_eq!(manifest.counts.skipped_ledger, 1);
    assert_eq!(manifest.counts.extracted, 1);
    assert_eq!(sink.appended(), vec!["snap-1", "snap-2"]);
}

#[tokio::test]
async fn test_undeliverable_record_is_retried_next_run() {
    let harness = TestHarness::new();
    let config = acme_config().max_attempts(1).build();

    // Sink rejects the batch and no fallback is configured.
    let failing = harness.pipeline(
        &config,
        Collaborators {
            oracle: ScriptedOracle::silent(),
            recovery: Arc::new(CannedRecovery(None)),
            triage: FixedClassifier::new(TriageLabel::Unknown),
            sink: Some(ScriptedSink::scripted(vec![AppendOutcome::Failed(
                "HTTP 400".to_string(),
            )])),
            fallback: None,
        },
    );
    let manifest = harness
        .run(&failing, vec![cash_snapshot("snap-1", "45000")])
        .await;
    assert_eq!(manifest.counts.extracted, 0);
    assert_eq!(manifest.failures_of(FailureCategory::SinkFailure), 1);
    assert!(!Ledger::new(harness.database()).is_processed("snap-1").unwrap());

    let sink = ScriptedSink::accepting();
    let healthy = harness.pipeline(
        &config,
        harness.collaborators(ScriptedOracle::silent(), Some(sink.clone())),
    );
    let manifest = harness
        .run(&healthy, vec![cash_snapshot("snap-1", "45000")])
        .await;
    assert_eq!(manifest.counts.skipped_ledger, 0);
    assert_eq!(manifest.counts.extracted, 1);
    assert_eq!(sink.appended(), vec!["snap-1"]);
}

#[tokio::test]
async fn test_duplicate_ids_within_a_batch_yield_one_record() {
    let harness = TestHarness::new();
    let sink = ScriptedSink::accepting();
    let pipeline = harness.pipeline(
        &acme_config().build(),
        harness.collaborators(ScriptedOracle::silent(), Some(sink.clone())),
    );

    let manifest = harness
        .run(
            &pipeline,
            vec![
                cash_snapshot("snap-1", "45000"),
                cash_snapshot("snap-1", "99000"),
            ],
        )
        .await;
    assert_eq!(manifest.counts.duplicates, 1);
    assert_eq!(sink.rows().len(), 1);
}
