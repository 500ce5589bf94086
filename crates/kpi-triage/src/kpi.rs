//! KPI record model shared by extraction, validation and the record sink.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The fixed set of indicators a record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiField {
    Revenue,
    Cash,
    PipelineValue,
    ClosingsCount,
    OrdersCount,
    Occupancy,
}

/// How a field's amount is parsed and bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Money,
    Count,
    Ratio,
}

impl KpiField {
    pub const ALL: [KpiField; 6] = [
        KpiField::Revenue,
        KpiField::Cash,
        KpiField::PipelineValue,
        KpiField::ClosingsCount,
        KpiField::OrdersCount,
        KpiField::Occupancy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KpiField::Revenue => "revenue",
            KpiField::Cash => "cash",
            KpiField::PipelineValue => "pipeline_value",
            KpiField::ClosingsCount => "closings_count",
            KpiField::OrdersCount => "orders_count",
            KpiField::Occupancy => "occupancy",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            KpiField::Revenue | KpiField::Cash | KpiField::PipelineValue => FieldKind::Money,
            KpiField::ClosingsCount | KpiField::OrdersCount => FieldKind::Count,
            KpiField::Occupancy => FieldKind::Ratio,
        }
    }
}

impl fmt::Display for KpiField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which extraction pass produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    Pattern,
    Oracle,
}

impl ExtractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionSource::Pattern => "pattern",
            ExtractionSource::Oracle => "oracle",
        }
    }
}

/// One field of a record. `amount == None` means the field was not found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiValue {
    pub amount: Option<f64>,
    pub evidence: String,
    pub source: Option<ExtractionSource>,
    pub confidence: f64,
    /// Label of the document the value came from.
    pub document: Option<String>,
}

impl KpiValue {
    pub fn empty() -> Self {
        Self {
            amount: None,
            evidence: String::new(),
            source: None,
            confidence: 0.0,
            document: None,
        }
    }

    pub fn found(
        amount: f64,
        evidence: impl Into<String>,
        source: ExtractionSource,
        confidence: f64,
    ) -> Self {
        Self {
            amount: Some(amount),
            evidence: evidence.into(),
            source: Some(source),
            confidence: confidence.clamp(0.0, 1.0),
            document: None,
        }
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn is_present(&self) -> bool {
        self.amount.is_some()
    }
}

/// A plausibility or rule breach carried through to the output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFlag {
    pub field: Option<KpiField>,
    pub code: String,
    pub detail: String,
}

impl ValidationFlag {
    pub fn new(field: Option<KpiField>, code: &str, detail: impl Into<String>) -> Self {
        Self {
            field,
            code: code.to_string(),
            detail: detail.into(),
        }
    }

    pub fn label(&self) -> String {
        match self.field {
            Some(field) => format!("{}:{}", field, self.code),
            None => self.code.clone(),
        }
    }
}

/// One record per (message, entity) pair that reached extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiRecord {
    pub message_id: String,
    pub entity: String,
    pub report_type: String,
    pub rule_name: String,
    pub report_date: NaiveDate,
    pub fields: BTreeMap<KpiField, KpiValue>,
    /// Share of the rule's expected fields that were found, 1.0 when none are declared.
    pub parse_confidence: f64,
    /// Documents that contributed to the record, in evaluation order.
    pub documents: Vec<String>,
    /// Notes from extraction guardrails (e.g. a rejected invoice amount).
    pub notes: Vec<String>,
    pub flags: Vec<ValidationFlag>,
}

impl KpiRecord {
    pub fn new(
        message_id: impl Into<String>,
        entity: impl Into<String>,
        report_type: impl Into<String>,
        rule_name: impl Into<String>,
        report_date: NaiveDate,
    ) -> Self {
        let fields = KpiField::ALL
            .into_iter()
            .map(|f| (f, KpiValue::empty()))
            .collect();
        Self {
            message_id: message_id.into(),
            entity: entity.into(),
            report_type: report_type.into(),
            rule_name: rule_name.into(),
            report_date,
            fields,
            parse_confidence: 1.0,
            documents: Vec::new(),
            notes: Vec::new(),
            flags: Vec::new(),
        }
    }

    pub fn value(&self, field: KpiField) -> Option<&KpiValue> {
        self.fields.get(&field)
    }

    pub fn amount(&self, field: KpiField) -> Option<f64> {
        self.fields.get(&field).and_then(|v| v.amount)
    }

    pub fn source(&self, field: KpiField) -> Option<ExtractionSource> {
        self.fields.get(&field).and_then(|v| v.source)
    }

    pub fn is_present(&self, field: KpiField) -> bool {
        self.amount(field).is_some()
    }

    pub fn set(&mut self, field: KpiField, value: KpiValue) {
        self.fields.insert(field, value);
    }

    pub fn present_fields(&self) -> Vec<KpiField> {
        KpiField::ALL
            .into_iter()
            .filter(|f| self.is_present(*f))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.present_fields().is_empty()
    }

    /// Mean confidence over present fields, 0.0 for an empty record.
    pub fn confidence(&self) -> f64 {
        let present: Vec<f64> = self
            .fields
            .values()
            .filter(|v| v.is_present())
            .map(|v| v.confidence)
            .collect();
        if present.is_empty() {
            return 0.0;
        }
        present.iter().sum::<f64>() / present.len() as f64
    }
}
