//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use chrono::{DateTime, TimeZone, Utc};
use zip::write::SimpleFileOptions;

use kpi_triage::config::schema::{EntityRules, SourceRule, TriageConfig};
use kpi_triage::message::{Attachment, Message, Sender};
use kpi_triage::KpiField;

/// Fixed clock for every test run: Friday 2026-03-06.
pub fn run_clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 6, 0, 0, 0).unwrap()
}

/// Received timestamp inside the default lookback window.
pub fn received() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

/// Builder for `TriageConfig` instances.
pub struct ConfigBuilder {
    config: TriageConfig,
}

impl ConfigBuilder {
    /// Defaults tuned for tests: no pacing delays and millisecond backoff.
    pub fn new() -> Self {
        let mut config = TriageConfig::default();
        config.triage.delay_ms = 0;
        config.sink.jitter = false;
        config.sink.initial_backoff_ms = 1;
        config.sink.max_backoff_ms = 4;
        Self { config }
    }

    pub fn trusted_sender(mut self, address: &str) -> Self {
        self.config.scoring.trusted_senders.push(address.to_string());
        self
    }

    pub fn trusted_domain(mut self, domain: &str) -> Self {
        self.config.scoring.trusted_domains.push(domain.to_string());
        self
    }

    pub fn source(mut self, rule: SourceRule) -> Self {
        self.config.matching.sources.push(rule);
        self
    }

    pub fn require(mut self, entity: &str, fields: &[KpiField]) -> Self {
        self.config.entities.insert(
            entity.to_string(),
            EntityRules {
                required: fields.to_vec(),
            },
        );
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.sink.batch_size = size;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.sink.max_attempts = attempts;
        self
    }

    pub fn max_split_depth(mut self, depth: u32) -> Self {
        self.config.sink.max_split_depth = depth;
        self
    }

    pub fn fallback_path(mut self, path: &str) -> Self {
        self.config.sink.fallback_path = path.to_string();
        self
    }

    pub fn build(self) -> TriageConfig {
        self.config
    }
}

/// Builder for `SourceRule` instances.
pub struct RuleBuilder {
    rule: SourceRule,
}

impl RuleBuilder {
    pub fn new(name: &str, entity: &str) -> Self {
        Self {
            rule: SourceRule {
                name: name.to_string(),
                entity: entity.to_string(),
                report_type: "kpi".to_string(),
                priority: 0,
                match_threshold: None,
                confidence_weight: 1.0,
                from_addresses: vec![],
                from_domains: vec![],
                subject_patterns: vec![],
                body_keywords: vec![],
                attachment_types: vec![],
                filename_patterns: vec![],
                expected_kpis: vec![],
            },
        }
    }

    pub fn report_type(mut self, report_type: &str) -> Self {
        self.rule.report_type = report_type.to_string();
        self
    }

    pub fn from_address(mut self, address: &str) -> Self {
        self.rule.from_addresses.push(address.to_string());
        self
    }

    pub fn from_domain(mut self, domain: &str) -> Self {
        self.rule.from_domains.push(domain.to_string());
        self
    }

    pub fn subject(mut self, pattern: &str) -> Self {
        self.rule.subject_patterns.push(pattern.to_string());
        self
    }

    pub fn attachment_type(mut self, kind: &str) -> Self {
        self.rule.attachment_types.push(kind.to_string());
        self
    }

    pub fn expects(mut self, fields: &[KpiField]) -> Self {
        self.rule.expected_kpis = fields.to_vec();
        self
    }

    pub fn build(self) -> SourceRule {
        self.rule
    }
}

/// The acme cash configuration most tests share.
pub fn acme_config() -> ConfigBuilder {
    ConfigBuilder::new()
        .trusted_sender("cfo@acme.com")
        .source(
            RuleBuilder::new("acme-cash", "acme")
                .report_type("cash")
                .from_address("cfo@acme.com")
                .from_domain("acme.com")
                .subject("cash")
                .attachment_type("xlsx")
                .expects(&[KpiField::Cash, KpiField::Revenue])
                .build(),
        )
        .require("acme", &[KpiField::Cash])
}

/// Builder for `Message` instances.
pub struct MessageBuilder {
    id: String,
    from: String,
    subject: String,
    body: String,
    received_at: DateTime<Utc>,
    folder: String,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            from: "cfo@acme.com".to_string(),
            subject: String::new(),
            body: String::new(),
            received_at: received(),
            folder: "Inbox".to_string(),
            attachments: vec![],
        }
    }

    pub fn from(mut self, address: &str) -> Self {
        self.from = address.to_string();
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }

    pub fn attachment(mut self, filename: &str, bytes: Vec<u8>) -> Self {
        self.attachments.push(Attachment::from_bytes(filename, bytes));
        self
    }

    pub fn build(self) -> Message {
        let mut message = Message::new(
            self.id,
            Sender::smtp(&self.from),
            self.subject,
            self.body,
            self.received_at,
        )
        .with_folder(self.folder);
        for attachment in self.attachments {
            message = message.with_attachment(attachment);
        }
        message
    }
}

/// The weekly cash snapshot from acme used by the end-to-end tests.
pub fn cash_snapshot(id: &str, cash: &str) -> Message {
    MessageBuilder::new(id)
        .subject("Weekly Cash Snapshot")
        .body("Please see the weekly snapshot attached.")
        .attachment(
            "Cash_Snapshot.xlsx",
            xlsx(&[
                (
                    "Summary",
                    vec![
                        vec!["Weekly Snapshot", "as of 03/01/2026"],
                        vec!["Cash Balance", cash],
                        vec!["Revenue MTD", "120000"],
                    ],
                ),
                (
                    "Proforma Model",
                    vec![vec!["IRR", "18%"], vec!["Revenue", "9999999"]],
                ),
            ]),
        )
        .build()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn column_name(index: usize) -> String {
    let mut name = String::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        name.insert(0, (b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    name
}

/// Minimal xlsx workbook: numeric cells are stored as values, everything
/// else as inline strings.
pub fn xlsx(sheets: &[(&str, Vec<Vec<&str>>)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default();

    let mut workbook = String::from(
        r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut rels = String::from("<Relationships>");
    for (i, (name, _)) in sheets.iter().enumerate() {
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape(name),
            i + 1,
            i + 1
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Target="worksheets/sheet{}.xml"/>"#,
            i + 1,
            i + 1
        ));
    }
    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");

    zip.start_file("xl/workbook.xml", opts).unwrap();
    zip.write_all(workbook.as_bytes()).unwrap();
    zip.start_file("xl/_rels/workbook.xml.rels", opts).unwrap();
    zip.write_all(rels.as_bytes()).unwrap();

    for (i, (_, rows)) in sheets.iter().enumerate() {
        let mut xml = String::from("<worksheet><sheetData>");
        for (r, row) in rows.iter().enumerate() {
            xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, cell) in row.iter().enumerate() {
                let reference = format!("{}{}", column_name(c), r + 1);
                if cell.parse::<f64>().is_ok() {
                    xml.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, cell));
                } else {
                    xml.push_str(&format!(
                        r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                        reference,
                        escape(cell)
                    ));
                }
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData></worksheet>");
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), opts)
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
    }

    zip.finish().unwrap().into_inner()
}
