//! Sender normalisation.
//!
//! Exchange hands out directory names such as
//! `/O=EXCHANGELABS/OU=.../CN=RECIPIENTS/CN=ABC123` instead of SMTP addresses.
//! These are resolved before scoring; a sender that cannot be resolved is
//! flagged rather than scored as an anonymous outsider.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::contains_term;

/// How the canonical address was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderResolution {
    /// The raw sender already was an SMTP address.
    Smtp,
    /// Taken from `Name <a@b>` or `Name (a@b)` in the display name.
    DisplayName,
    /// Looked up in the configured alias directory.
    Directory,
    /// No address could be derived.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    /// Lower-cased SMTP address; empty when unresolved.
    pub address: String,
    /// Lower-cased domain; empty when unresolved.
    pub domain: String,
    pub display_name: Option<String>,
    /// Directory alias or raw identifier, kept for audit.
    pub raw: String,
    pub resolution: SenderResolution,
}

fn embedded_smtp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[(<]([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})[)>]")
            .unwrap_or_else(|e| panic!("static regex failed to compile: {e}"))
    })
}

fn directory_cn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)/CN=RECIPIENTS/CN=([^/]+)")
            .unwrap_or_else(|e| panic!("static regex failed to compile: {e}"))
    })
}

pub fn is_directory_name(raw: &str) -> bool {
    raw.trim_start().to_ascii_uppercase().starts_with("/O=")
}

impl Sender {
    /// Builds a sender from a plain SMTP address.
    pub fn smtp(address: &str) -> Self {
        let address = address.trim().to_lowercase();
        Self {
            domain: domain_of(&address),
            raw: address.clone(),
            address,
            display_name: None,
            resolution: SenderResolution::Smtp,
        }
    }

    /// Resolves a raw sender identifier to a canonical address.
    ///
    /// Order: address embedded in the display name, plain SMTP, directory
    /// alias lookup. Anything else is `Unresolved`.
    pub fn resolve(
        raw: &str,
        display_name: Option<&str>,
        directory: &BTreeMap<String, String>,
    ) -> Self {
        let raw = raw.trim();
        let display_name = display_name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if let Some(name) = &display_name {
            if let Some(caps) = embedded_smtp_re().captures(name) {
                let address = caps[1].to_lowercase();
                return Self {
                    domain: domain_of(&address),
                    address,
                    display_name,
                    raw: raw.to_string(),
                    resolution: SenderResolution::DisplayName,
                };
            }
        }

        if !raw.is_empty() && !is_directory_name(raw) && raw.contains('@') {
            let mut sender = Self::smtp(raw);
            sender.display_name = display_name;
            return sender;
        }

        let alias = directory_cn_re()
            .captures(raw)
            .map(|c| c[1].trim().to_lowercase())
            .unwrap_or_default();

        let name_key = display_name
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();
        let looked_up = [alias.as_str(), name_key.as_str()]
            .into_iter()
            .filter(|k| !k.is_empty())
            .find_map(|k| directory.get(k).cloned());

        if let Some(address) = looked_up {
            return Self {
                domain: domain_of(&address),
                address,
                display_name,
                raw: raw.to_string(),
                resolution: SenderResolution::Directory,
            };
        }

        Self {
            address: String::new(),
            domain: String::new(),
            display_name,
            raw: if alias.is_empty() {
                raw.to_string()
            } else {
                alias
            },
            resolution: SenderResolution::Unresolved,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution != SenderResolution::Unresolved
    }

    pub fn local_part(&self) -> &str {
        self.address.split('@').next().unwrap_or_default()
    }

    /// Local part looks like a newsletter, no-reply or notification robot.
    pub fn looks_like_broadcast(&self, local_parts: &[String]) -> bool {
        let local = self.local_part();
        !local.is_empty()
            && local_parts
                .iter()
                .any(|p| contains_term(local, &p.to_lowercase()))
    }
}

fn domain_of(address: &str) -> String {
    address
        .rsplit_once('@')
        .map(|(_, d)| d.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DN: &str =
        "/O=EXCHANGELABS/OU=EXCHANGE ADMINISTRATIVE GROUP (FYDIBOHF23SPDLT)/CN=RECIPIENTS/CN=JDOE42";

    fn directory() -> BTreeMap<String, String> {
        BTreeMap::from([("jdoe42".to_string(), "jane.doe@acme.com".to_string())])
    }

    #[test]
    fn test_plain_smtp() {
        let sender = Sender::resolve("CFO@Acme.com", None, &BTreeMap::new());
        assert_eq!(sender.address, "cfo@acme.com");
        assert_eq!(sender.domain, "acme.com");
        assert_eq!(sender.resolution, SenderResolution::Smtp);
    }

    #[test]
    fn test_display_name_address_wins() {
        let sender = Sender::resolve(DN, Some("Jane Doe (Jane.Doe@acme.com)"), &BTreeMap::new());
        assert_eq!(sender.address, "jane.doe@acme.com");
        assert_eq!(sender.resolution, SenderResolution::DisplayName);
    }

    #[test]
    fn test_directory_alias_lookup() {
        let sender = Sender::resolve(DN, Some("Jane Doe"), &directory());
        assert_eq!(sender.address, "jane.doe@acme.com");
        assert_eq!(sender.domain, "acme.com");
        assert_eq!(sender.resolution, SenderResolution::Directory);
    }

    #[test]
    fn test_unresolved_directory_name_is_flagged() {
        let sender = Sender::resolve(DN, Some("Jane Doe"), &BTreeMap::new());
        assert!(!sender.is_resolved());
        assert_eq!(sender.address, "");
        assert_eq!(sender.domain, "");
        assert_eq!(sender.raw, "jdoe42");
    }

    #[test]
    fn test_empty_sender_is_unresolved() {
        assert!(!Sender::resolve("", None, &BTreeMap::new()).is_resolved());
    }

    #[test]
    fn test_broadcast_local_parts() {
        let parts = crate::config::defaults::newsletter_local_parts();
        assert!(Sender::smtp("newsletter@vendor.com").looks_like_broadcast(&parts));
        assert!(Sender::smtp("no-reply@vendor.com").looks_like_broadcast(&parts));
        assert!(Sender::smtp("info@vendor.com").looks_like_broadcast(&parts));
        assert!(!Sender::smtp("information.desk@vendor.com").looks_like_broadcast(&parts));
        assert!(!Sender::smtp("cfo@acme.com").looks_like_broadcast(&parts));
    }
}
