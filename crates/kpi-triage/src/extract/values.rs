//! Numeric token parsing for KPI cells.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::kpi::FieldKind;

const AMOUNT: &str = r"(?i)(\()?\s*(-)?(usd\s*)?([$€£]\s*)?(-)?(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?(?:\s*(mm|bn|k|m|b))?\b\s*(%)?\s*(\))?";

struct Patterns {
    anywhere: Regex,
    whole: Regex,
    currency: Regex,
    dates: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile =
            |p: &str| Regex::new(p).unwrap_or_else(|e| panic!("static regex failed to compile: {e}"));
        Patterns {
            anywhere: compile(AMOUNT),
            whole: compile(&format!(r"^\s*(?:{})\s*$", AMOUNT)),
            currency: compile(r"(?i)(?:[$€£]|\busd)\s*-?\d"),
            dates: compile(
                r"(?i)\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b|\b\d{4}-\d{1,2}-\d{1,2}\b|\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}\b",
            ),
        }
    })
}

/// A parsed numeric token before it is interpreted for a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Amount {
    pub value: f64,
    pub currency: bool,
    pub percent: bool,
    /// No currency sign, separators, decimals or scale suffix.
    pub bare: bool,
}

fn from_captures(caps: &Captures<'_>) -> Option<Amount> {
    let digits = caps.get(6)?.as_str();
    let fraction = caps.get(7).map_or("", |m| m.as_str());
    let mut value: f64 = format!("{}{}", digits.replace(',', ""), fraction).parse().ok()?;

    let suffix = caps.get(8).map(|m| m.as_str().to_ascii_lowercase());
    value *= match suffix.as_deref() {
        Some("k") => 1e3,
        Some("m") | Some("mm") => 1e6,
        Some("b") | Some("bn") => 1e9,
        _ => 1.0,
    };

    let parenthesised = caps.get(1).is_some() && caps.get(10).is_some();
    if parenthesised || caps.get(2).is_some() || caps.get(5).is_some() {
        value = -value;
    }

    let currency = caps.get(3).is_some() || caps.get(4).is_some();
    Some(Amount {
        value,
        currency,
        percent: caps.get(9).is_some(),
        bare: !currency && suffix.is_none() && fraction.is_empty() && !digits.contains(','),
    })
}

/// Parses a cell that holds nothing but an amount (`$45,000`, `(1.2m)`, `92%`).
pub fn parse_cell(cell: &str) -> Option<Amount> {
    patterns()
        .whole
        .captures(cell)
        .and_then(|caps| from_captures(&caps))
}

/// Every amount in free text, in order. Dates are blanked out first.
pub fn amounts_in(text: &str) -> Vec<Amount> {
    let p = patterns();
    let cleaned = p.dates.replace_all(text, " ");
    p.anywhere
        .captures_iter(&cleaned)
        .filter_map(|caps| from_captures(&caps))
        .collect()
}

/// Number of currency-marked amounts in `text`.
pub fn currency_amount_count(text: &str) -> usize {
    patterns().currency.find_iter(text).count()
}

fn looks_like_year(amount: &Amount) -> bool {
    amount.bare && (1900.0..=2100.0).contains(&amount.value)
}

/// Interprets an amount for a field of the given kind, or rejects it.
pub fn field_value(amount: &Amount, kind: FieldKind) -> Option<f64> {
    match kind {
        FieldKind::Money => {
            if amount.percent || looks_like_year(amount) {
                return None;
            }
            // Small bare integers are row numbers and date parts, not money.
            if amount.bare && amount.value.abs() < 100.0 {
                return None;
            }
            Some(amount.value)
        }
        FieldKind::Count => {
            if amount.percent || amount.currency || looks_like_year(amount) {
                return None;
            }
            Some(amount.value)
        }
        FieldKind::Ratio => {
            if amount.currency {
                return None;
            }
            if amount.percent || (amount.value > 1.0 && amount.value <= 100.0) {
                Some(amount.value / 100.0)
            } else {
                Some(amount.value)
            }
        }
    }
}
