//! Content heuristics: reporting dates and table-shaped text.

use std::sync::OnceLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;

struct DatePatterns {
    month_first: Regex,
    year_first: Regex,
    month_name: Regex,
}

fn date_patterns() -> &'static DatePatterns {
    static PATTERNS: OnceLock<DatePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile =
            |p: &str| Regex::new(p).unwrap_or_else(|e| panic!("static regex failed to compile: {e}"));
        DatePatterns {
            month_first: compile(r"\b(\d{1,2})[/-](\d{1,2})[/-](20\d{2})\b"),
            year_first: compile(r"\b(20\d{2})[/-](\d{1,2})[/-](\d{1,2})\b"),
            month_name: compile(
                r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\.?\s+(\d{1,2}),?\s+(20\d{2})\b",
            ),
        }
    })
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_ascii_lowercase().get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Every well-formed date in the text (`MM/DD/YYYY`, `YYYY-MM-DD`,
/// `Month DD, YYYY`). Impossible dates such as 02/30 are skipped.
pub fn find_dates(text: &str) -> Vec<NaiveDate> {
    let patterns = date_patterns();
    let mut dates = Vec::new();

    for caps in patterns.month_first.captures_iter(text) {
        if let (Ok(m), Ok(d), Ok(y)) = (caps[1].parse(), caps[2].parse(), caps[3].parse()) {
            dates.extend(NaiveDate::from_ymd_opt(y, m, d));
        }
    }
    for caps in patterns.year_first.captures_iter(text) {
        if let (Ok(y), Ok(m), Ok(d)) = (caps[1].parse(), caps[2].parse(), caps[3].parse()) {
            dates.extend(NaiveDate::from_ymd_opt(y, m, d));
        }
    }
    for caps in patterns.month_name.captures_iter(text) {
        if let (Some(m), Ok(d), Ok(y)) = (month_number(&caps[1]), caps[2].parse(), caps[3].parse())
        {
            dates.extend(NaiveDate::from_ymd_opt(y, m, d));
        }
    }

    dates
}

/// A date in `[as_of - within_days, as_of + 1 day]`.
pub fn has_recent_date(text: &str, as_of: NaiveDate, within_days: i64) -> bool {
    let earliest = as_of - Duration::days(within_days);
    let latest = as_of + Duration::days(1);
    find_dates(text)
        .into_iter()
        .any(|d| d >= earliest && d <= latest)
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d[\d,]*\.?\d*").unwrap_or_else(|e| panic!("static regex: {e}"))
    })
}

fn delimiter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\t|]| {2,}").unwrap_or_else(|e| panic!("static regex: {e}")))
}

/// At least three lines that each carry two numbers and a column delimiter.
pub fn looks_tabular(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && number_re().find_iter(line).take(2).count() >= 2
                && delimiter_re().is_match(line)
        })
        .take(3)
        .count()
        >= 3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_find_dates_all_formats() {
        let dates = find_dates("as of 03/02/2026, run 2026-03-01 and Feb. 27, 2026");
        assert_eq!(
            dates,
            vec![day(2026, 3, 2), day(2026, 3, 1), day(2026, 2, 27)]
        );
    }

    #[test]
    fn test_impossible_dates_are_skipped() {
        assert!(find_dates("02/30/2026").is_empty());
        assert!(find_dates("13/01/2026").is_empty());
    }

    #[test]
    fn test_recent_window() {
        let as_of = day(2026, 3, 9);
        assert!(has_recent_date("week ending 03/02/2026", as_of, 7));
        assert!(has_recent_date("dated 2026-03-10", as_of, 7));
        assert!(!has_recent_date("dated 2026-03-11", as_of, 7));
        assert!(!has_recent_date("dated 2026-03-01", as_of, 7));
    }

    #[test]
    fn test_looks_tabular() {
        let table = "Cash\t45,000\t44,100\nRevenue\t12,000\t11,000\nOrders | 12 | 14\n";
        assert!(looks_tabular(table));
        assert!(!looks_tabular("Cash 45,000 44,100\nRevenue 12,000 11,000\nOrders 12 14"));
        assert!(!looks_tabular("Cash\t45,000\t1\nRevenue\t12,000\t2"));
    }
}
