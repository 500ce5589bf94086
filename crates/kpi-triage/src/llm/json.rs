//! Recovery of a JSON object from free-form model output.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

fn trailing_comma() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r",\s*([\]}])").unwrap_or_else(|e| panic!("static regex failed to compile: {e}"))
    })
}

/// Extracts the outermost JSON object from `raw`.
///
/// Tolerates markdown fences, leading reasoning text and trailing commas.
/// Returns `None` when no object can be parsed.
pub fn parse_json_object(raw: &str) -> Option<Map<String, Value>> {
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    let candidate = &trimmed[start..=end];

    let parsed = serde_json::from_str::<Value>(candidate).or_else(|_| {
        let cleaned = trailing_comma().replace_all(candidate, "$1");
        serde_json::from_str::<Value>(&cleaned)
    });

    match parsed {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let map = parse_json_object(r#"{"label": "operational"}"#).unwrap();
        assert_eq!(map["label"], "operational");
    }

    #[test]
    fn test_fenced_object() {
        let raw = "```json\n{\"cash\": {\"value\": 45000}}\n```";
        let map = parse_json_object(raw).unwrap();
        assert_eq!(map["cash"]["value"], 45000);
    }

    #[test]
    fn test_reasoning_prefix_and_trailing_comma() {
        let raw = "Let me think.\n{\"a\": 1, \"b\": [1, 2,],}";
        let map = parse_json_object(raw).unwrap();
        assert_eq!(map["a"], 1);
        assert_eq!(map["b"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_garbage() {
        assert!(parse_json_object("no json here").is_none());
        assert!(parse_json_object("} {").is_none());
        assert!(parse_json_object("{not json}").is_none());
    }
}
