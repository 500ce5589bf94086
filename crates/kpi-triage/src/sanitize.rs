//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Run logs are shared for debugging; these functions keep sender addresses,
//! full paths and document contents out of span fields.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks the local part of an address, keeping its first character and the domain.
///
/// - `jane.doe@acme.com` → `j***@acme.com`
/// - `not-an-address` → `***`
pub fn mask_address(address: &str) -> String {
    match address.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        _ => "***".to_string(),
    }
}

/// Truncates a snippet to at most `max_chars` characters, on a char boundary.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut out: String = collapsed.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Short deterministic hash for correlating a message id without logging it.
pub fn hash_id(id: &str) -> String {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/srv/mail/attachments/cash.xlsx")),
            "cash.xlsx"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_mask_address() {
        assert_eq!(mask_address("jane.doe@acme.com"), "j***@acme.com");
        assert_eq!(mask_address("@acme.com"), "***");
        assert_eq!(mask_address("nobody"), "***");
    }

    #[test]
    fn test_truncate_snippet() {
        assert_eq!(truncate_snippet("Cash   45,000\n", 20), "Cash 45,000");
        assert_eq!(truncate_snippet("abcdef", 3), "abc…");
    }

    #[test]
    fn test_hash_id_deterministic() {
        assert_eq!(hash_id("m1"), hash_id("m1"));
        assert_ne!(hash_id("m1"), hash_id("m2"));
        assert_eq!(hash_id("m1").len(), 16);
    }
}
