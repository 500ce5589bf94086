//! Runs driven by a config file and a directory of `.eml` files.

mod common;

use assert_fs::prelude::*;

use common::*;
use kpi_triage::ledger::Ledger;
use kpi_triage::pipeline::FailureCategory;
use kpi_triage::{load_config, Disposition, EmlDirectorySource};

const CONFIG_YAML: &str = r#"
version: "1"
scoring:
  trusted_senders: ["CFO@acme.com"]
matching:
  sources:
    - name: acme-cash
      entity: acme
      report_type: cash
      from_addresses: ["cfo@acme.com"]
      from_domains: ["acme.com"]
      subject_patterns: ["cash"]
      expected_kpis: [cash]
entities:
  acme:
    required: [cash]
mail:
  sender_directory:
    JSmith: jsmith@acme.com
triage:
  delay_ms: 0
"#;

const CASH_EML: &str = "From: Jane Doe <CFO@Acme.com>\r\n\
Subject: Weekly Cash Snapshot\r\n\
Date: Mon, 2 Mar 2026 09:00:00 +0000\r\n\
Message-ID: <cash-1@acme.com>\r\n\
Content-Type: text/plain\r\n\
\r\n\
Cash balance: $45,000\r\n\
Week ending 03/01/2026\r\n";

const DIRECTORY_EML: &str = "From: \"/O=EXCHANGELABS/OU=GROUP/CN=RECIPIENTS/CN=JSMITH\" <>\r\n\
Subject: Numbers\r\n\
Date: Tue, 3 Mar 2026 09:00:00 +0000\r\n\
Message-ID: <numbers-1@acme.com>\r\n\
\r\n\
Revenue 12,000\r\n";

const ARCHIVED_EML: &str = "From: cfo@acme.com\r\n\
Subject: Weekly Cash Snapshot\r\n\
Date: Mon, 2 Mar 2026 10:00:00 +0000\r\n\
Message-ID: <archived-1@acme.com>\r\n\
\r\n\
Cash balance: $50,000\r\n";

#[tokio::test]
async fn test_run_from_config_file_and_eml_directory() {
    let mail = assert_fs::TempDir::new().unwrap();
    mail.child("Inbox/cash.eml").write_str(CASH_EML).unwrap();
    mail.child("Inbox/numbers.eml").write_str(DIRECTORY_EML).unwrap();
    mail.child("Inbox/empty.eml").write_str("").unwrap();
    mail.child("Archive/old.eml").write_str(ARCHIVED_EML).unwrap();
    let config_file = mail.child("triage.yaml");
    config_file.write_str(CONFIG_YAML).unwrap();

    let mut config = load_config(config_file.path()).unwrap();
    assert_eq!(config.scoring.trusted_senders, vec!["cfo@acme.com"]);

    let harness = TestHarness::new();
    let sink = ScriptedSink::accepting();
    let pipeline = harness.pipeline(
        &config,
        harness.collaborators(ScriptedOracle::silent(), Some(sink.clone())),
    );
    config.mail.eml_directory = Some(mail.path().to_string_lossy().into_owned());
    let source = EmlDirectorySource::from_config(&config.mail).expect("eml directory configured");

    let manifest = harness.run_source(&pipeline, &source).await;

    assert_eq!(manifest.counts.scanned, 3);
    assert_eq!(manifest.failures_of(FailureCategory::InputDefect), 1);
    assert_eq!(manifest.counts.extracted, 1);
    assert_eq!(manifest.counts.rejected, 1);
    assert_eq!(sink.appended(), vec!["cash-1@acme.com"]);
    assert_eq!(sink.rows()[0].cash, Some(45_000.0));

    let ledger = Ledger::new(harness.database());
    let numbers = ledger.entry("numbers-1@acme.com").unwrap().unwrap();
    assert_eq!(numbers.disposition, Disposition::Rejected);
    assert_eq!(numbers.audit.sender.as_deref(), Some("jsmith@acme.com"));
    assert!(!ledger.is_processed("archived-1@acme.com").unwrap());

    mail.close().unwrap();
}
