//! Synonym table mapping label variants to KPI fields.

use std::collections::BTreeMap;

use crate::config::schema::LabelConfig;
use crate::error::ConfigError;
use crate::kpi::KpiField;
use crate::text::{contains_term, term_positions};

/// A label found inside a cell. Offsets index the lower-cased cell.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelHit {
    pub field: KpiField,
    pub variant: String,
    pub start: usize,
    pub end: usize,
    /// The whole cell is the label, give or take trailing punctuation.
    pub exact: bool,
}

#[derive(Debug, Clone)]
pub struct LabelTable {
    /// Longest variants first, so "cash balance" wins over "cash".
    entries: Vec<(String, KpiField)>,
}

impl LabelTable {
    pub fn new(synonyms: &BTreeMap<String, Vec<String>>) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        for field in KpiField::ALL {
            let Some(variants) = synonyms.get(field.as_str()) else {
                continue;
            };
            for variant in variants {
                let variant = variant.trim().to_lowercase();
                if !variant.is_empty() && !entries.iter().any(|(v, _)| *v == variant) {
                    entries.push((variant, field));
                }
            }
        }
        if let Some(unknown) = synonyms.keys().find(|k| KpiField::parse(k).is_none()) {
            return Err(ConfigError::UnknownField {
                context: "labels.synonyms".to_string(),
                field: unknown.clone(),
            });
        }
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(Self { entries })
    }

    pub fn from_config(config: &LabelConfig) -> Result<Self, ConfigError> {
        Self::new(&config.synonyms)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if any variant of `field` appears in the lower-cased `text`.
    pub fn mentions(&self, text: &str, field: KpiField) -> bool {
        self.entries
            .iter()
            .any(|(variant, f)| *f == field && contains_term(text, variant))
    }

    /// Non-overlapping label hits in a lower-cased cell, left to right.
    pub fn hits(&self, cell: &str) -> Vec<LabelHit> {
        let normalized = cell.trim().trim_end_matches([':', '=', '-', '.']).trim_end();
        let mut hits: Vec<LabelHit> = Vec::new();
        for (variant, field) in &self.entries {
            for start in term_positions(cell, variant) {
                let end = start + variant.len();
                if hits.iter().any(|h| start < h.end && h.start < end) {
                    continue;
                }
                hits.push(LabelHit {
                    field: *field,
                    variant: variant.clone(),
                    start,
                    end,
                    exact: normalized == variant.as_str(),
                });
            }
        }
        hits.sort_by_key(|h| h.start);
        hits
    }

    /// True if the cell contains any label at all.
    pub fn is_label(&self, cell: &str) -> bool {
        self.entries.iter().any(|(v, _)| contains_term(cell, v))
    }
}
