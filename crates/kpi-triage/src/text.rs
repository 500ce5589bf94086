//! Case-insensitive term matching shared by the scorers.

use regex::{Regex, RegexBuilder};

use crate::error::ConfigError;

/// Compiles configured patterns case-insensitively.
pub fn compile_patterns(patterns: &[String], name: &str) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| ConfigError::InvalidPattern {
                    name: name.to_string(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

/// True when `term` occurs in `haystack` and is not glued to surrounding
/// alphanumerics, so "nda" does not fire on "Monday".
///
/// Both arguments are expected to be lower-cased already.
pub fn contains_term(haystack: &str, term: &str) -> bool {
    !term_positions(haystack, term).is_empty()
}

/// Byte offsets of every word-bounded occurrence of `term` in `haystack`.
pub fn term_positions(haystack: &str, term: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    if term.is_empty() {
        return positions;
    }
    let bytes = haystack.as_bytes();
    // A term starting or ending in punctuation ("% occupied") is its own boundary.
    let open_start = !term.chars().next().is_some_and(char::is_alphanumeric);
    let open_end = !term.chars().last().is_some_and(char::is_alphanumeric);
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(term) {
        let begin = start + pos;
        let end = begin + term.len();
        let before_ok = begin == 0 || !is_word_byte(bytes[begin - 1]);
        let after_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        if (before_ok || open_start) && (after_ok || open_end) {
            positions.push(begin);
        }
        start = begin + haystack[begin..].chars().next().map_or(1, char::len_utf8);
    }
    positions
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Terms from `terms` found in `haystack`, in list order.
pub fn matching_terms<'a>(haystack: &str, terms: &'a [String]) -> Vec<&'a str> {
    terms
        .iter()
        .map(String::as_str)
        .filter(|t| contains_term(haystack, &t.to_lowercase()))
        .collect()
}

/// Keeps at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
