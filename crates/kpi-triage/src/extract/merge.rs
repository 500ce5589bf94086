//! Per-document extraction and the merge into one record per message.
//!
//! Pattern values are authoritative. The oracle is consulted for Tier 1
//! documents, and for Tier 2 documents where the pattern pass found at most
//! one field; its proposals only fill fields that are still null. Across
//! documents, every pattern value outranks every oracle value, and earlier
//! documents (attachments, then sheets, then the body) outrank later ones.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::{ExtractionConfig, LabelConfig};
use crate::document::Document;
use crate::error::ConfigError;
use crate::kpi::{ExtractionSource, KpiField, KpiRecord, KpiValue};
use crate::matching::SourceMatch;
use crate::message::Message;
use crate::oracle::{propose_with_timeout, screen_proposal, ExtractionOracle, OracleRequest, OracleResponse};
use crate::sanitize::truncate_snippet;
use crate::suitability::{AssessedDocument, SuitabilityVerdict, Tier};
use crate::text::{matching_terms, truncate_chars};

use super::labels::LabelTable;
use super::pattern::PatternExtractor;
use super::values::currency_amount_count;

#[derive(Debug, Clone, PartialEq)]
pub enum OracleStatus {
    NotRequested,
    Used,
    Unavailable(String),
}

/// What one document contributed before merging.
#[derive(Debug, Clone)]
pub struct DocumentExtraction {
    pub document: String,
    pub pattern: BTreeMap<KpiField, KpiValue>,
    pub oracle: BTreeMap<KpiField, KpiValue>,
    pub oracle_status: OracleStatus,
    pub notes: Vec<String>,
}

impl DocumentExtraction {
    fn empty(document: String) -> Self {
        Self {
            document,
            pattern: BTreeMap::new(),
            oracle: BTreeMap::new(),
            oracle_status: OracleStatus::NotRequested,
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub record: KpiRecord,
    pub documents: Vec<DocumentExtraction>,
}

impl ExtractionOutcome {
    /// Oracle calls that were attempted but came back unavailable.
    pub fn oracle_failures(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| matches!(d.oracle_status, OracleStatus::Unavailable(_)))
            .count()
    }
}

pub struct KpiExtractor {
    pattern: PatternExtractor,
    oracle: Arc<dyn ExtractionOracle>,
    config: ExtractionConfig,
}

impl KpiExtractor {
    pub fn new(
        config: &ExtractionConfig,
        labels: &LabelConfig,
        oracle: Arc<dyn ExtractionOracle>,
    ) -> Result<Self, ConfigError> {
        let table = LabelTable::from_config(labels)?;
        Ok(Self {
            pattern: PatternExtractor::new(table, config.evidence_chars),
            oracle,
            config: config.clone(),
        })
    }

    /// Extracts from every Tier 1/2 document of a matched message and merges.
    pub async fn extract(
        &self,
        message: &Message,
        source: &SourceMatch,
        assessed: &[AssessedDocument],
    ) -> ExtractionOutcome {
        let mut eligible: Vec<&AssessedDocument> = assessed
            .iter()
            .filter(|a| a.verdict.tier.is_extractable())
            .collect();
        eligible.sort_by_key(|a| a.document.origin.rank());

        let mut parts = Vec::with_capacity(eligible.len());
        for item in eligible {
            parts.push(
                self.extract_document(&item.document, &item.verdict, source)
                    .await,
            );
        }
        let record = self.merge(message, source, &parts);
        ExtractionOutcome {
            record,
            documents: parts,
        }
    }

    /// Runs both passes over one document. Tier 3/4 documents yield nothing.
    pub async fn extract_document(
        &self,
        document: &Document,
        verdict: &SuitabilityVerdict,
        source: &SourceMatch,
    ) -> DocumentExtraction {
        let label = document.label();
        let mut out = DocumentExtraction::empty(label.clone());
        if !verdict.tier.is_extractable() {
            return out;
        }

        let text = document.text();
        let lower = text.to_lowercase();
        out.pattern = self.pattern.extract(document);

        let invoice_like = verdict.score < self.config.invoice_min_score
            && !matching_terms(&lower, &self.config.invoice_terms).is_empty();
        let single_amount = currency_amount_count(&text) <= 1;
        if invoice_like && single_amount && out.pattern.remove(&KpiField::Revenue).is_some() {
            out.notes.push(format!(
                "invoice_guardrail: revenue from {} rejected (single amount in invoice-like text)",
                label
            ));
        }

        let wants_oracle = match verdict.tier {
            Tier::One => true,
            Tier::Two => out.pattern.len() <= 1,
            _ => false,
        };
        let missing: Vec<KpiField> = KpiField::ALL
            .into_iter()
            .filter(|f| !out.pattern.contains_key(f))
            .collect();
        if !wants_oracle || missing.is_empty() || !self.oracle.is_enabled() {
            return out;
        }

        let request = OracleRequest {
            document: &label,
            excerpt: truncate_chars(&text, self.config.oracle.max_excerpt_chars),
            fields: &missing,
        };
        let timeout = Duration::from_secs(self.config.oracle.timeout_secs);
        match propose_with_timeout(self.oracle.as_ref(), &request, timeout).await {
            OracleResponse::Proposals(proposals) => {
                out.oracle_status = OracleStatus::Used;
                for proposal in proposals {
                    if out.pattern.contains_key(&proposal.field) || out.oracle.contains_key(&proposal.field) {
                        continue;
                    }
                    let screened = match screen_proposal(&proposal, self.config.oracle.min_confidence) {
                        Ok(p) => p,
                        Err(reason) => {
                            tracing::debug!(field = %proposal.field, %reason, "Oracle proposal rejected");
                            continue;
                        }
                    };
                    if proposal.field == KpiField::Revenue
                        && invoice_like
                        && (single_amount
                            || !self
                                .pattern
                                .labels()
                                .mentions(&screened.evidence.to_lowercase(), KpiField::Revenue))
                    {
                        out.notes.push(format!(
                            "invoice_guardrail: oracle revenue from {} rejected",
                            label
                        ));
                        continue;
                    }
                    if let Some(amount) = screened.value {
                        out.oracle.insert(
                            screened.field,
                            KpiValue::found(
                                amount,
                                truncate_snippet(&screened.evidence, self.config.evidence_chars),
                                ExtractionSource::Oracle,
                                screened.confidence,
                            )
                            .with_document(label.clone()),
                        );
                    }
                }
            }
            OracleResponse::Unavailable(reason) => {
                tracing::warn!(document = %label, %reason, "Oracle unavailable; keeping pattern results");
                out.oracle_status = OracleStatus::Unavailable(reason);
            }
        }
        tracing::debug!(
            document = %label,
            entity = %source.entity,
            pattern = out.pattern.len(),
            oracle = out.oracle.len(),
            "Document extracted"
        );
        out
    }

    /// Folds per-document results into one record: pattern values first in
    /// document order, then oracle values for the fields still null.
    pub fn merge(&self, message: &Message, source: &SourceMatch, parts: &[DocumentExtraction]) -> KpiRecord {
        let mut record = KpiRecord::new(
            message.id.clone(),
            source.entity.clone(),
            source.report_type.clone(),
            source.rule_name.clone(),
            message.received_at.date_naive(),
        );

        let mut contributors: Vec<&str> = Vec::new();
        for part in parts {
            fill(&mut record, &mut contributors, &part.document, &part.pattern);
        }
        for part in parts {
            fill(&mut record, &mut contributors, &part.document, &part.oracle);
        }
        record.documents = parts
            .iter()
            .map(|p| p.document.clone())
            .filter(|d| contributors.contains(&d.as_str()))
            .collect();
        record.notes = parts.iter().flat_map(|p| p.notes.iter().cloned()).collect();

        if !source.expected_kpis.is_empty() {
            let present = source
                .expected_kpis
                .iter()
                .filter(|f| record.is_present(**f))
                .count();
            record.parse_confidence = present as f64 / source.expected_kpis.len() as f64;
        }
        record
    }
}

fn fill<'a>(
    record: &mut KpiRecord,
    contributors: &mut Vec<&'a str>,
    document: &'a str,
    values: &BTreeMap<KpiField, KpiValue>,
) {
    for (field, value) in values {
        if record.is_present(*field) {
            continue;
        }
        record.set(*field, value.clone());
        if !contributors.contains(&document) {
            contributors.push(document);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Sheet;
    use crate::message::Sender;
    use crate::oracle::FieldProposal;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedOracle {
        response: OracleResponse,
        calls: AtomicUsize,
    }

    impl ScriptedOracle {
        fn proposing(proposals: Vec<(KpiField, f64, &str)>) -> Arc<Self> {
            Arc::new(Self {
                response: OracleResponse::Proposals(
                    proposals
                        .into_iter()
                        .map(|(field, value, evidence)| FieldProposal {
                            field,
                            value: Some(value),
                            evidence: evidence.to_string(),
                            confidence: 0.8,
                        })
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            })
        }

        fn unavailable() -> Arc<Self> {
            Arc::new(Self {
                response: OracleResponse::Unavailable("HTTP 503".to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExtractionOracle for ScriptedOracle {
        async fn propose(&self, _request: &OracleRequest<'_>) -> OracleResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    fn extractor(oracle: Arc<dyn ExtractionOracle>) -> KpiExtractor {
        KpiExtractor::new(&ExtractionConfig::default(), &LabelConfig::default(), oracle).unwrap()
    }

    fn verdict(document: &Document, tier: Tier, score: i32) -> SuitabilityVerdict {
        SuitabilityVerdict {
            document: document.label(),
            score,
            tier,
            hard_reject: false,
            reasons: Vec::new(),
            reject_hits: Vec::new(),
            required_ocr: false,
        }
    }

    fn assessed(document: Document, tier: Tier, score: i32) -> AssessedDocument {
        let verdict = verdict(&document, tier, score);
        AssessedDocument {
            document,
            verdict,
            recovery_unavailable: None,
        }
    }

    fn source(expected: Vec<KpiField>) -> SourceMatch {
        SourceMatch {
            rule_name: "acme-cash".to_string(),
            entity: "acme".to_string(),
            report_type: "cash".to_string(),
            score: 0.8,
            expected_kpis: expected,
            relaxed: false,
        }
    }

    fn message() -> Message {
        Message::new(
            "m1",
            Sender::smtp("cfo@acme.com"),
            "Weekly Cash Snapshot",
            "",
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_pattern_beats_oracle() {
        let oracle = ScriptedOracle::proposing(vec![
            (KpiField::Cash, 46000.0, "cash 46,000"),
            (KpiField::Revenue, 12000.0, "revenue 12,000"),
        ]);
        let extractor = extractor(oracle.clone());
        let doc = Document::body("Cash: $45,000");
        let outcome = extractor
            .extract(&message(), &source(vec![]), &[assessed(doc, Tier::One, 7)])
            .await;

        let record = outcome.record;
        assert_eq!(record.amount(KpiField::Cash), Some(45000.0));
        assert_eq!(record.source(KpiField::Cash), Some(ExtractionSource::Pattern));
        assert_eq!(record.amount(KpiField::Revenue), Some(12000.0));
        assert_eq!(record.source(KpiField::Revenue), Some(ExtractionSource::Oracle));
        assert_eq!(oracle.calls(), 1);
        assert_eq!(record.report_date.to_string(), "2026-03-02");
    }

    #[tokio::test]
    async fn test_tier_two_with_two_fields_skips_oracle() {
        let oracle = ScriptedOracle::proposing(vec![(KpiField::Revenue, 12000.0, "revenue")]);
        let extractor = extractor(oracle.clone());
        let doc = Document::body("Cash: $45,000\nOrders: 12");
        let outcome = extractor
            .extract(&message(), &source(vec![]), &[assessed(doc, Tier::Two, 4)])
            .await;
        assert_eq!(oracle.calls(), 0);
        assert!(!outcome.record.is_present(KpiField::Revenue));
        assert_eq!(outcome.documents[0].oracle_status, OracleStatus::NotRequested);
    }

    #[tokio::test]
    async fn test_tier_two_with_one_field_calls_oracle() {
        let oracle = ScriptedOracle::proposing(vec![(KpiField::Revenue, 12000.0, "revenue")]);
        let extractor = extractor(oracle.clone());
        let doc = Document::body("Cash: $45,000");
        let outcome = extractor
            .extract(&message(), &source(vec![]), &[assessed(doc, Tier::Two, 4)])
            .await;
        assert_eq!(oracle.calls(), 1);
        assert!(outcome.record.is_present(KpiField::Revenue));
    }

    #[tokio::test]
    async fn test_unavailable_oracle_degrades_to_pattern_only() {
        let oracle = ScriptedOracle::unavailable();
        let extractor = extractor(oracle.clone());
        let doc = Document::body("Cash: $45,000");
        let outcome = extractor
            .extract(&message(), &source(vec![]), &[assessed(doc, Tier::One, 8)])
            .await;
        assert_eq!(outcome.record.amount(KpiField::Cash), Some(45000.0));
        assert_eq!(outcome.oracle_failures(), 1);
    }

    #[tokio::test]
    async fn test_ineligible_documents_are_ignored() {
        let oracle = ScriptedOracle::proposing(vec![]);
        let extractor = extractor(oracle.clone());
        let doc = Document::body("Cash: $45,000");
        let outcome = extractor
            .extract(&message(), &source(vec![]), &[assessed(doc, Tier::Four, 9)])
            .await;
        assert!(outcome.record.is_empty());
        assert!(outcome.documents.is_empty());
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_invoice_guardrail() {
        let extractor = extractor(Arc::new(crate::oracle::DisabledOracle));
        let doc = Document::plain("inv.txt", "INVOICE 4471\nBill to: Acme\nTotal sales $1,200");

        let low = extractor
            .extract_document(&doc, &verdict(&doc, Tier::Two, 4), &source(vec![]))
            .await;
        assert!(!low.pattern.contains_key(&KpiField::Revenue));
        assert!(low.notes[0].starts_with("invoice_guardrail"));

        let high = extractor
            .extract_document(&doc, &verdict(&doc, Tier::One, 6), &source(vec![]))
            .await;
        assert_eq!(high.pattern[&KpiField::Revenue].amount, Some(1200.0));
    }

    #[tokio::test]
    async fn test_oracle_revenue_needs_label_in_invoice_text() {
        let oracle = ScriptedOracle::proposing(vec![(KpiField::Revenue, 1200.0, "Amount due $1,200")]);
        let extractor = extractor(oracle);
        let doc = Document::plain("inv.txt", "Invoice\nAmount due $1,200\nShipping $40");
        let part = extractor
            .extract_document(&doc, &verdict(&doc, Tier::Two, 4), &source(vec![]))
            .await;
        assert!(part.oracle.is_empty());
        assert!(part.notes.iter().any(|n| n.contains("oracle revenue")));
    }

    #[tokio::test]
    async fn test_attachment_outranks_body() {
        let extractor = extractor(Arc::new(crate::oracle::DisabledOracle));
        let body = Document::body("Cash: $1,000");
        let sheet = Document::sheets(
            "cash.xlsx",
            vec![Sheet::new("Summary", vec![vec!["Cash".into(), "45,000".into()]])],
        );
        let outcome = extractor
            .extract(
                &message(),
                &source(vec![KpiField::Cash, KpiField::Revenue]),
                &[assessed(body, Tier::One, 6), assessed(sheet, Tier::Two, 4)],
            )
            .await;
        let record = outcome.record;
        assert_eq!(record.amount(KpiField::Cash), Some(45000.0));
        assert_eq!(record.documents, vec!["cash.xlsx"]);
        assert_eq!(record.parse_confidence, 0.5);
    }

    struct ExcerptRecorder {
        seen: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ExtractionOracle for ExcerptRecorder {
        async fn propose(&self, request: &OracleRequest<'_>) -> OracleResponse {
            self.seen.lock().unwrap().push(request.excerpt.chars().count());
            OracleResponse::Proposals(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_oracle_sees_bounded_excerpt() {
        let recorder = Arc::new(ExcerptRecorder {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let mut config = ExtractionConfig::default();
        config.oracle.max_excerpt_chars = 40;
        let extractor =
            KpiExtractor::new(&config, &LabelConfig::default(), recorder.clone()).unwrap();

        let text = format!("Cash: $45,000\n{}", "é weekly commentary ".repeat(50));
        let doc = Document::body(&text);
        let outcome = extractor
            .extract(&message(), &source(vec![]), &[assessed(doc, Tier::One, 7)])
            .await;

        assert_eq!(*recorder.seen.lock().unwrap(), vec![40]);
        assert_eq!(outcome.record.amount(KpiField::Cash), Some(45000.0));
    }
}
