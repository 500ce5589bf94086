//! Deterministic pass: synonym-aware label/value matching over line cells.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::document::Document;
use crate::kpi::{ExtractionSource, KpiField, KpiValue};
use crate::sanitize::truncate_snippet;

use super::labels::{LabelHit, LabelTable};
use super::values::{amounts_in, field_value, parse_cell};

const EXACT_CONFIDENCE: f64 = 0.9;
const PARTIAL_CONFIDENCE: f64 = 0.75;
/// How many cells to the right of a label may hold its value.
const VALUE_LOOKAHEAD: usize = 3;

fn cell_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[:\t|]+|\s{2,}")
            .unwrap_or_else(|e| panic!("static regex failed to compile: {e}"))
    })
}

fn split_cells(line: &str) -> Vec<String> {
    cell_separator()
        .split(line)
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect()
}

pub struct PatternExtractor {
    labels: LabelTable,
    evidence_chars: usize,
}

impl PatternExtractor {
    pub fn new(labels: LabelTable, evidence_chars: usize) -> Self {
        Self {
            labels,
            evidence_chars,
        }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Finds at most one value per field; the first hit in reading order wins.
    pub fn extract(&self, document: &Document) -> BTreeMap<KpiField, KpiValue> {
        let label = document.label();
        let mut found: BTreeMap<KpiField, KpiValue> = BTreeMap::new();

        for line in document.text().lines() {
            if found.len() == KpiField::ALL.len() {
                break;
            }
            let cells = split_cells(line);
            for (idx, cell) in cells.iter().enumerate() {
                let hits = self.labels.hits(cell);
                for (n, hit) in hits.iter().enumerate() {
                    if found.contains_key(&hit.field) {
                        continue;
                    }
                    let segment_end = hits.get(n + 1).map_or(cell.len(), |next| next.start);
                    let is_last = n + 1 == hits.len();
                    let Some(amount) = self.value_for(hit, &cell[hit.end..segment_end], &cells[idx + 1..], is_last)
                    else {
                        continue;
                    };
                    let confidence = if hit.exact {
                        EXACT_CONFIDENCE
                    } else {
                        PARTIAL_CONFIDENCE
                    };
                    tracing::trace!(field = %hit.field, amount, document = %label, "Pattern hit");
                    found.insert(
                        hit.field,
                        KpiValue::found(
                            amount,
                            truncate_snippet(line, self.evidence_chars),
                            ExtractionSource::Pattern,
                            confidence,
                        )
                        .with_document(label.clone()),
                    );
                }
            }
        }
        found
    }

    /// Looks for a value after the label inside its own cell, then in the
    /// following cells up to the next label.
    fn value_for(&self, hit: &LabelHit, segment: &str, rest: &[String], is_last: bool) -> Option<f64> {
        let kind = hit.field.kind();
        if let Some(v) = amounts_in(segment)
            .iter()
            .find_map(|a| field_value(a, kind))
        {
            return Some(v);
        }
        if !is_last {
            return None;
        }
        for cell in rest.iter().take(VALUE_LOOKAHEAD) {
            if let Some(v) = parse_cell(cell).and_then(|a| field_value(&a, kind)) {
                return Some(v);
            }
            if self.labels.is_label(cell) {
                break;
            }
        }
        None
    }
}
