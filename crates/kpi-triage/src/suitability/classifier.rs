//! Document suitability tiers.
//!
//! Additive score: time-relevance term +2, recent reporting date +2, KPI label
//! +2, aggregate-total language +1, tabular lines +1, MTD snapshot +2 (time
//! term together with two KPI labels), +2 per accepted sheet-name category.
//! A hard-reject term in the text or a rejected sheet name forces Tier 4.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::schema::SuitabilityConfig;
use crate::document::Document;
use crate::suitability::signals::{has_recent_date, looks_tabular};
use crate::text::{contains_term, matching_terms};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    One,
    Two,
    /// Text recovery must run before the document is rejected.
    Three,
    Four,
}

impl Tier {
    pub fn number(&self) -> u8 {
        match self {
            Tier::One => 1,
            Tier::Two => 2,
            Tier::Three => 3,
            Tier::Four => 4,
        }
    }

    pub fn is_extractable(&self) -> bool {
        matches!(self, Tier::One | Tier::Two)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier{}", self.number())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuitabilityVerdict {
    pub document: String,
    pub score: i32,
    pub tier: Tier,
    pub hard_reject: bool,
    pub reasons: Vec<String>,
    pub reject_hits: Vec<String>,
    /// Text recovery was needed (and attempted) for this document.
    pub required_ocr: bool,
}

pub struct SuitabilityClassifier {
    config: SuitabilityConfig,
}

impl SuitabilityClassifier {
    pub fn new(config: &SuitabilityConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn min_text_chars(&self) -> usize {
        self.config.min_text_chars
    }

    /// Scores one document. `as_of` anchors the recent-date window.
    pub fn classify(&self, document: &Document, as_of: NaiveDate) -> SuitabilityVerdict {
        let label = document.label();
        let _span = tracing::debug_span!("classify", document = %label).entered();

        let cfg = &self.config;
        let text = document.text();
        let lower = text.to_lowercase();
        let mut score = 0;
        let mut reasons = Vec::new();
        let mut reject_hits: Vec<String> = matching_terms(&lower, &cfg.hard_reject_terms)
            .into_iter()
            .map(str::to_string)
            .collect();

        let sheet_names: Vec<String> = document
            .sheet_names()
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        if !sheet_names.is_empty() {
            for term in &cfg.sheet_accept_terms {
                let term = term.to_lowercase();
                if sheet_names.iter().any(|s| contains_term(s, &term)) {
                    score += 2;
                    reasons.push(format!("+2 sheet name '{}'", term));
                }
            }
            for term in &cfg.sheet_reject_terms {
                let term = term.to_lowercase();
                if sheet_names.iter().any(|s| contains_term(s, &term)) {
                    reject_hits.push(format!("sheet:{}", term));
                }
            }
        }

        let time_hits = matching_terms(&lower, &cfg.time_terms);
        if !time_hits.is_empty() {
            score += 2;
            reasons.push(format!("+2 time relevance: {}", time_hits.join(", ")));
        }
        if has_recent_date(&text, as_of, cfg.recent_days) {
            score += 2;
            reasons.push("+2 recent reporting date".to_string());
        }
        let kpi_hits = matching_terms(&lower, &cfg.kpi_label_terms);
        if !kpi_hits.is_empty() {
            score += 2;
            reasons.push(format!("+2 KPI labels: {}", kpi_hits.join(", ")));
        }
        let total_hits = matching_terms(&lower, &cfg.total_terms);
        if !total_hits.is_empty() {
            score += 1;
            reasons.push(format!("+1 totals: {}", total_hits.join(", ")));
        }
        if looks_tabular(&text) {
            score += 1;
            reasons.push("+1 tabular".to_string());
        }
        if !time_hits.is_empty() && kpi_hits.len() >= 2 {
            score += 2;
            reasons.push("+2 MTD snapshot".to_string());
        }

        let scanned = !document.has_text_layer(cfg.min_text_chars);
        let filename_hints: Vec<&str> = document
            .filename()
            .map(|f| {
                let f = f.to_lowercase();
                cfg.report_filename_hints
                    .iter()
                    .map(String::as_str)
                    .filter(|h| f.contains(&h.to_lowercase()))
                    .collect()
            })
            .unwrap_or_default();

        let hard_reject = !reject_hits.is_empty();
        let tier = if hard_reject {
            reasons.push(format!("reject: {}", reject_hits.join(", ")));
            Tier::Four
        } else if score >= 6 {
            Tier::One
        } else if score >= 4 {
            Tier::Two
        } else if scanned && (!filename_hints.is_empty() || score >= 3) {
            reasons.push(format!(
                "tier3: no text layer, filename hints: {}",
                filename_hints.join(", ")
            ));
            Tier::Three
        } else if score == 3 && document.is_pages() && !filename_hints.is_empty() {
            reasons.push(format!(
                "tier3: report filename hints: {}",
                filename_hints.join(", ")
            ));
            Tier::Three
        } else {
            reasons.push(format!("tier4: score {}", score));
            Tier::Four
        };

        tracing::debug!(score, tier = %tier, hard_reject, "Document classified");

        SuitabilityVerdict {
            document: label,
            score,
            tier,
            hard_reject,
            reasons,
            reject_hits,
            required_ocr: tier == Tier::Three,
        }
    }
}
