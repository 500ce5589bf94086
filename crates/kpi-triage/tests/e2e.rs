//! End-to-end runs over in-memory mail: scoring through the record sink.

mod common;

use std::sync::Arc;

use common::*;
use kpi_triage::db::{run_repo, triage_repo};
use kpi_triage::ledger::Ledger;
use kpi_triage::pipeline::{Collaborators, FailureCategory};
use kpi_triage::quarantine::TriageLabel;
use kpi_triage::sink::CsvFallback;
use kpi_triage::{Disposition, KpiField, RunManifest};

#[tokio::test]
async fn test_weekly_cash_snapshot_end_to_end() {
    let harness = TestHarness::new();
    let oracle = ScriptedOracle::proposing(&[
        (KpiField::Occupancy, 92.0, "Occupancy 92%"),
        (KpiField::Revenue, 500_000.0, "Revenue 500,000"),
    ]);
    let sink = ScriptedSink::accepting();
    let pipeline = harness.pipeline(
        &acme_config().build(),
        harness.collaborators(oracle.clone(), Some(sink.clone())),
    );

    let manifest = harness
        .run(&pipeline, vec![cash_snapshot("snap-1", "45000")])
        .await;

    assert_eq!(manifest.counts.scanned, 1);
    assert_eq!(manifest.counts.matched, 1);
    assert_eq!(manifest.counts.extracted, 1);
    assert_eq!(manifest.counts.appended, 1);
    // Only the Summary sheet is Tier 1; the model sheet and the body are not.
    assert_eq!(oracle.calls(), 1);

    let rows = sink.rows();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.entity, "acme");
    assert_eq!(row.date, "2026-03-02");
    assert_eq!(row.cash, Some(45_000.0));
    // Pattern value wins over the oracle's proposal for the same field.
    assert_eq!(row.revenue, Some(120_000.0));
    assert_eq!(row.occupancy, Some(0.92));
    assert_eq!(row.source_type, "pattern+oracle");
    assert_eq!(row.attachment_name, "Cash_Snapshot.xlsx#Summary");
    assert!(!row.attachment_name.contains("Proforma"));
    assert_eq!(row.sender, "cfo@acme.com");
    assert!(row.candidate_reasons.contains("trusted_sender(+3)"));

    let entry = Ledger::new(harness.database())
        .entry("snap-1")
        .unwrap()
        .unwrap();
    assert_eq!(entry.disposition, Disposition::Extracted);
    assert_eq!(entry.audit.entity.as_deref(), Some("acme"));
    assert!(harness.fallback_rows().is_empty());
}

#[tokio::test]
async fn test_rejected_sheet_never_contributes() {
    let harness = TestHarness::new();
    let sink = ScriptedSink::accepting();
    let pipeline = harness.pipeline(
        &acme_config().build(),
        harness.collaborators(ScriptedOracle::silent(), Some(sink.clone())),
    );
    let message = MessageBuilder::new("snap-2")
        .subject("Weekly Cash Snapshot")
        .attachment(
            "Cash_Snapshot.xlsx",
            xlsx(&[
                (
                    "Summary",
                    vec![
                        vec!["Weekly Snapshot", "as of 03/01/2026"],
                        vec!["Cash Balance", "45000"],
                        vec!["Bank balance MTD", "45000"],
                    ],
                ),
                (
                    "Proforma Model",
                    vec![vec!["Revenue", "9999999"], vec!["IRR", "18%"]],
                ),
            ]),
        )
        .build();

    let manifest = harness.run(&pipeline, vec![message]).await;
    assert_eq!(manifest.counts.extracted, 1);
    let row = &sink.rows()[0];
    assert_eq!(row.cash, Some(45_000.0));
    assert_eq!(row.revenue, None);
}

#[tokio::test]
async fn test_missing_required_field_drops_record() {
    let harness = TestHarness::new();
    let sink = ScriptedSink::accepting();
    let pipeline = harness.pipeline(
        &acme_config().build(),
        harness.collaborators(ScriptedOracle::silent(), Some(sink.clone())),
    );
    let message = MessageBuilder::new("rev-only")
        .subject("Weekly Cash Snapshot")
        .attachment(
            "Revenue_Summary.xlsx",
            xlsx(&[(
                "Summary",
                vec![
                    vec!["Weekly Snapshot", "as of 03/01/2026"],
                    vec!["Revenue MTD", "120000"],
                    vec!["Closings", "14"],
                ],
            )]),
        )
        .build();

    let manifest = harness.run(&pipeline, vec![message]).await;
    assert_eq!(manifest.counts.dropped, 1);
    assert!(sink.calls().is_empty());

    let outcome = manifest.outcome("rev-only").unwrap();
    assert_eq!(outcome.disposition, Some(Disposition::Dropped));
    assert_eq!(
        outcome.detail.as_deref(),
        Some("missing all required fields: cash")
    );
}

#[tokio::test]
async fn test_unmatched_candidate_is_quarantined_and_triaged() {
    let harness = TestHarness::new();
    let classifier = FixedClassifier::new(TriageLabel::FinancialReport);
    let pipeline = harness.pipeline(
        &acme_config().build(),
        Collaborators {
            oracle: ScriptedOracle::silent(),
            recovery: Arc::new(CannedRecovery(None)),
            triage: classifier.clone(),
            sink: Some(ScriptedSink::accepting()),
            fallback: Some(CsvFallback::new(&harness.fallback_path)),
        },
    );
    let message = MessageBuilder::new("partner-1")
        .from("ops@partner.com")
        .subject("Weekly KPI report")
        .body("Revenue $12,000 and cash $4,500 this week")
        .build();

    let manifest = harness.run(&pipeline, vec![message]).await;
    assert_eq!(manifest.counts.quarantined, 1);
    assert_eq!(manifest.counts.triaged, 1);
    assert_eq!(classifier.calls(), 1);
    assert_eq!(manifest.triage.by_label["financial_report"], 1);
    assert_eq!(
        manifest.outcome("partner-1").unwrap().detail.as_deref(),
        Some("triage: financial_report")
    );

    let db = harness.database();
    assert_eq!(
        Ledger::new(db.clone()).entry("partner-1").unwrap().unwrap().disposition,
        Disposition::Quarantined
    );
    assert_eq!(triage_repo::find_by_label(&db, "financial_report").unwrap().len(), 1);
}

#[tokio::test]
async fn test_low_scoring_mail_is_rejected_with_reasons() {
    let harness = TestHarness::new();
    let pipeline = harness.pipeline(
        &acme_config().build(),
        harness.collaborators(ScriptedOracle::silent(), None),
    );
    let message = MessageBuilder::new("promo-1")
        .from("newsletter@vendor.com")
        .subject("Our weekly report is here")
        .body("Click to unsubscribe")
        .build();

    let manifest = harness.run(&pipeline, vec![message]).await;
    assert_eq!(manifest.counts.rejected, 1);
    let outcome = manifest.outcome("promo-1").unwrap();
    assert_eq!(outcome.disposition, Some(Disposition::Rejected));
    assert!(outcome.score < 3);
    assert!(outcome.detail.as_deref().unwrap().contains("newsletter(-3)"));
}

#[tokio::test]
async fn test_undecodable_attachment_is_an_input_defect() {
    let harness = TestHarness::new();
    let sink = ScriptedSink::accepting();
    let pipeline = harness.pipeline(
        &acme_config().build(),
        harness.collaborators(ScriptedOracle::silent(), Some(sink.clone())),
    );
    let message = MessageBuilder::new("broken-1")
        .subject("Weekly Cash Snapshot")
        .body("Cash balance: $45,000\nWeek ending 03/01/2026")
        .attachment("Cash_Snapshot.xlsx", b"not a workbook".to_vec())
        .build();

    let manifest = harness.run(&pipeline, vec![message]).await;
    assert_eq!(manifest.failures_of(FailureCategory::InputDefect), 1);
    // The body still carries the figures.
    assert_eq!(manifest.counts.extracted, 1);
    assert_eq!(sink.rows()[0].cash, Some(45_000.0));
}

#[tokio::test]
async fn test_manifest_is_recorded_in_run_history() {
    let harness = TestHarness::new();
    let pipeline = harness.pipeline(
        &acme_config().build(),
        harness.collaborators(ScriptedOracle::silent(), Some(ScriptedSink::accepting())),
    );

    let manifest = harness
        .run(&pipeline, vec![cash_snapshot("snap-1", "45000")])
        .await;

    let stored = run_repo::find(&harness.database(), &manifest.run_id)
        .unwrap()
        .expect("run row");
    let restored: RunManifest = serde_json::from_str(&stored.manifest).unwrap();
    assert_eq!(restored, manifest);
    assert_eq!(
        restored.config_fingerprint,
        pipeline.config().config_fingerprint
    );
}
