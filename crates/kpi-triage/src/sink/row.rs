//! Flat output row handed to a record sink.

use serde::{Deserialize, Serialize};

use crate::kpi::{KpiField, KpiRecord};
use crate::sanitize::truncate_snippet;

/// Column order shared by every sink and the local fallback.
pub const COLUMN_ORDER: [&str; 22] = [
    "date",
    "entity",
    "revenue",
    "cash",
    "pipeline_value",
    "closings_count",
    "orders_count",
    "occupancy",
    "alerts",
    "notes",
    "run_id",
    "message_id",
    "sender",
    "subject",
    "candidate_score",
    "candidate_reasons",
    "source_type",
    "attachment_name",
    "evidence_snippet",
    "extractor_version",
    "confidence",
    "validation_flags",
];

const EVIDENCE_CHARS: usize = 300;

/// Message-level context that is not part of the record itself.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub run_id: &'a str,
    pub sender: &'a str,
    pub subject: &'a str,
    pub candidate_score: i32,
    pub candidate_reasons: &'a str,
    pub extractor_version: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRow {
    pub date: String,
    pub entity: String,
    pub revenue: Option<f64>,
    pub cash: Option<f64>,
    pub pipeline_value: Option<f64>,
    pub closings_count: Option<f64>,
    pub orders_count: Option<f64>,
    pub occupancy: Option<f64>,
    pub alerts: String,
    pub notes: String,
    pub run_id: String,
    pub message_id: String,
    pub sender: String,
    pub subject: String,
    pub candidate_score: i32,
    pub candidate_reasons: String,
    pub source_type: String,
    pub attachment_name: String,
    pub evidence_snippet: String,
    pub extractor_version: String,
    pub confidence: f64,
    pub validation_flags: String,
}

impl SinkRow {
    pub fn from_record(record: &KpiRecord, ctx: &RowContext<'_>) -> Self {
        let mut sources: Vec<&str> = Vec::new();
        for field in record.present_fields() {
            if let Some(source) = record.source(field) {
                if !sources.contains(&source.as_str()) {
                    sources.push(source.as_str());
                }
            }
        }
        let evidence = record
            .present_fields()
            .into_iter()
            .filter_map(|f| {
                let value = record.value(f)?;
                (!value.evidence.is_empty()).then(|| format!("{}: {}", f, value.evidence))
            })
            .collect::<Vec<_>>()
            .join(" | ");
        let alerts = record
            .flags
            .iter()
            .filter(|f| f.field.is_some())
            .map(|f| f.detail.clone())
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            date: record.report_date.format("%Y-%m-%d").to_string(),
            entity: record.entity.clone(),
            revenue: record.amount(KpiField::Revenue),
            cash: record.amount(KpiField::Cash),
            pipeline_value: record.amount(KpiField::PipelineValue),
            closings_count: record.amount(KpiField::ClosingsCount),
            orders_count: record.amount(KpiField::OrdersCount),
            occupancy: record.amount(KpiField::Occupancy),
            alerts,
            notes: record.notes.join("; "),
            run_id: ctx.run_id.to_string(),
            message_id: record.message_id.clone(),
            sender: ctx.sender.to_string(),
            subject: ctx.subject.to_string(),
            candidate_score: ctx.candidate_score,
            candidate_reasons: ctx.candidate_reasons.to_string(),
            source_type: sources.join("+"),
            attachment_name: record.documents.join("; "),
            evidence_snippet: truncate_snippet(&evidence, EVIDENCE_CHARS),
            extractor_version: ctx.extractor_version.to_string(),
            confidence: (record.confidence() * record.parse_confidence * 100.0).round() / 100.0,
            validation_flags: record
                .flags
                .iter()
                .map(|f| f.label())
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Cell values in `COLUMN_ORDER`.
    pub fn values(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.entity.clone(),
            format_amount(self.revenue),
            format_amount(self.cash),
            format_amount(self.pipeline_value),
            format_amount(self.closings_count),
            format_amount(self.orders_count),
            format_amount(self.occupancy),
            self.alerts.clone(),
            self.notes.clone(),
            self.run_id.clone(),
            self.message_id.clone(),
            self.sender.clone(),
            self.subject.clone(),
            self.candidate_score.to_string(),
            self.candidate_reasons.clone(),
            self.source_type.clone(),
            self.attachment_name.clone(),
            self.evidence_snippet.clone(),
            self.extractor_version.clone(),
            format!("{:.2}", self.confidence),
            self.validation_flags.clone(),
        ]
    }
}

fn format_amount(amount: Option<f64>) -> String {
    match amount {
        Some(v) if v.fract() == 0.0 => format!("{:.0}", v),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}
