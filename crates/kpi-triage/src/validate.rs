//! Record validation: per-entity required fields and plausibility bounds.
//!
//! Bound breaches are flagged and carried to the output row, never corrected.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::schema::{EntityRules, ValidationConfig};
use crate::kpi::{FieldKind, KpiField, KpiRecord, ValidationFlag};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Accept,
    Flag { flags: Vec<ValidationFlag> },
    Drop { reason: String },
}

impl ValidationOutcome {
    pub fn is_drop(&self) -> bool {
        matches!(self, ValidationOutcome::Drop { .. })
    }

    pub fn flags(&self) -> &[ValidationFlag] {
        match self {
            ValidationOutcome::Flag { flags } => flags,
            _ => &[],
        }
    }
}

pub struct Validator {
    entities: BTreeMap<String, EntityRules>,
    config: ValidationConfig,
}

impl Validator {
    pub fn new(entities: &BTreeMap<String, EntityRules>, config: &ValidationConfig) -> Self {
        Self {
            entities: entities.clone(),
            config: config.clone(),
        }
    }

    pub fn required_fields(&self, entity: &str) -> &[KpiField] {
        self.entities
            .get(entity)
            .map(|r| r.required.as_slice())
            .unwrap_or(&[])
    }

    /// `relaxed` records came in through a trusted-domain relaxed threshold;
    /// they skip the required-field check and are always flagged.
    pub fn validate(&self, record: &KpiRecord, relaxed: bool) -> ValidationOutcome {
        let _span = tracing::debug_span!("validate", entity = %record.entity).entered();

        if self.config.require_kpi && record.is_empty() {
            return ValidationOutcome::Drop {
                reason: "no KPI values extracted".to_string(),
            };
        }

        let required = self.required_fields(&record.entity);
        if !relaxed && !required.is_empty() && !required.iter().any(|f| record.is_present(*f)) {
            let names: Vec<&str> = required.iter().map(KpiField::as_str).collect();
            return ValidationOutcome::Drop {
                reason: format!("missing all required fields: {}", names.join(", ")),
            };
        }

        let mut flags = Vec::new();
        if relaxed {
            flags.push(ValidationFlag::new(
                None,
                "relaxed_match",
                "matched through a trusted-domain relaxed threshold",
            ));
            let missing: Vec<&str> = required
                .iter()
                .filter(|f| !record.is_present(**f))
                .map(KpiField::as_str)
                .collect();
            if !missing.is_empty() {
                flags.push(ValidationFlag::new(
                    None,
                    "missing_required",
                    missing.join(", "),
                ));
            }
        }

        for field in KpiField::ALL {
            if let Some(amount) = record.amount(field) {
                flags.extend(self.check_bounds(field, amount));
            }
        }

        if flags.is_empty() {
            ValidationOutcome::Accept
        } else {
            tracing::debug!(flags = flags.len(), "Record flagged");
            ValidationOutcome::Flag { flags }
        }
    }

    fn check_bounds(&self, field: KpiField, amount: f64) -> Vec<ValidationFlag> {
        let mut flags = Vec::new();
        match field.kind() {
            FieldKind::Ratio => {
                if !(0.0..=1.0).contains(&amount) {
                    flags.push(ValidationFlag::new(
                        Some(field),
                        "out_of_range",
                        format!("{} outside [0, 1]", amount),
                    ));
                }
            }
            FieldKind::Count => {
                if amount < 0.0 {
                    flags.push(ValidationFlag::new(Some(field), "negative", amount.to_string()));
                }
                if amount.fract() != 0.0 {
                    flags.push(ValidationFlag::new(Some(field), "not_integer", amount.to_string()));
                }
            }
            FieldKind::Money => {
                if amount < 0.0 {
                    flags.push(ValidationFlag::new(Some(field), "negative", amount.to_string()));
                }
                if amount.abs() > self.config.max_money {
                    flags.push(ValidationFlag::new(
                        Some(field),
                        "implausible",
                        format!("{} above {}", amount, self.config.max_money),
                    ));
                }
            }
        }
        flags
    }
}
