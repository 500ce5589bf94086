use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::schema::{TriageConfig, UnmatchedPolicy};
use crate::error::ConfigError;
use crate::kpi::KpiField;

const SUPPORTED_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }
}

/// Loads, normalizes and validates a configuration file.
///
/// Line-list files referenced by the config are resolved relative to the
/// config file's directory.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TriageConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = parse(&content, ConfigFormat::from_path(path))?;
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    merge_line_lists(&mut config, &base)?;
    normalize(&mut config);
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config_from_str(
    content: &str,
    format: ConfigFormat,
) -> Result<TriageConfig, ConfigError> {
    let mut config = parse(content, format)?;
    merge_line_lists(&mut config, Path::new("."))?;
    normalize(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Normalizes and validates a configuration built in code.
pub fn prepare_config(mut config: TriageConfig) -> Result<TriageConfig, ConfigError> {
    normalize(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn parse(content: &str, format: ConfigFormat) -> Result<TriageConfig, ConfigError> {
    Ok(match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    })
}

/// Reads a one-entry-per-line file; blank lines and `#` comments are skipped.
pub fn load_line_list(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_lowercase)
        .collect())
}

fn resolve(base: &Path, file: &str) -> PathBuf {
    let path = PathBuf::from(file);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

fn merge_line_lists(config: &mut TriageConfig, base: &Path) -> Result<(), ConfigError> {
    let scoring = &mut config.scoring;
    if let Some(file) = &scoring.trusted_senders_file {
        scoring
            .trusted_senders
            .extend(load_line_list(&resolve(base, file))?);
    }
    if let Some(file) = &scoring.trusted_domains_file {
        scoring
            .trusted_domains
            .extend(load_line_list(&resolve(base, file))?);
    }
    if let Some(file) = &scoring.deny_domains_file {
        scoring
            .deny_domains
            .extend(load_line_list(&resolve(base, file))?);
    }
    Ok(())
}

/// Lower-cases, trims and de-duplicates address and domain lists, keeping
/// first occurrence order.
fn normalize(config: &mut TriageConfig) {
    fn clean(list: &mut Vec<String>) {
        let mut seen = HashSet::new();
        let cleaned: Vec<String> = list
            .iter()
            .map(|s| s.trim().trim_start_matches('@').to_lowercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        *list = cleaned;
    }

    clean(&mut config.scoring.trusted_senders);
    clean(&mut config.scoring.trusted_domains);
    clean(&mut config.scoring.deny_domains);
    for rule in &mut config.matching.sources {
        clean(&mut rule.from_addresses);
        clean(&mut rule.from_domains);
    }
    for policy in &mut config.matching.domain_policies {
        policy.domain = policy.domain.trim().trim_start_matches('@').to_lowercase();
    }
    config.mail.sender_directory = std::mem::take(&mut config.mail.sender_directory)
        .into_iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_lowercase()))
        .collect();

    tracing::info!(
        trusted_senders = config.scoring.trusted_senders.len(),
        trusted_domains = config.scoring.trusted_domains.len(),
        deny_domains = config.scoring.deny_domains.len(),
        sources = config.matching.sources.len(),
        "Config normalized"
    );
}

fn validate_config(config: &TriageConfig) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if !(0.0..=1.0).contains(&config.matching.default_threshold) {
        return Err(ConfigError::Validation {
            message: format!(
                "matching.default_threshold must be within [0, 1], got {}",
                config.matching.default_threshold
            ),
        });
    }

    let scoring = &config.scoring;
    for (list, name) in [
        (&scoring.subject_patterns, "scoring.subject_patterns"),
        (&scoring.meeting_patterns, "scoring.meeting_patterns"),
        (
            &scoring.quarantine_digest_patterns,
            "scoring.quarantine_digest_patterns",
        ),
        (
            &scoring.noise_filename_patterns,
            "scoring.noise_filename_patterns",
        ),
    ] {
        validate_patterns(list, name)?;
    }

    let mut names = HashSet::new();
    for rule in &config.matching.sources {
        if rule.name.trim().is_empty() {
            return Err(ConfigError::InvalidRule {
                id: "<unnamed>".to_string(),
                reason: "Rule name must not be empty".to_string(),
            });
        }
        if !names.insert(rule.name.as_str()) {
            return Err(ConfigError::InvalidRule {
                id: rule.name.clone(),
                reason: "Duplicate rule name".to_string(),
            });
        }
        if rule.entity.trim().is_empty() {
            return Err(ConfigError::InvalidRule {
                id: rule.name.clone(),
                reason: "Missing target entity".to_string(),
            });
        }
        if !rule.has_predicates() {
            return Err(ConfigError::InvalidRule {
                id: rule.name.clone(),
                reason: "Rule declares no match predicates".to_string(),
            });
        }
        if let Some(threshold) = rule.match_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidRule {
                    id: rule.name.clone(),
                    reason: format!("match_threshold must be within [0, 1], got {}", threshold),
                });
            }
        }
        if !(rule.confidence_weight > 0.0 && rule.confidence_weight <= 1.0) {
            return Err(ConfigError::InvalidRule {
                id: rule.name.clone(),
                reason: format!(
                    "confidence_weight must be within (0, 1], got {}",
                    rule.confidence_weight
                ),
            });
        }
        for pattern in rule.subject_patterns.iter().chain(&rule.filename_patterns) {
            if let Err(e) = Regex::new(pattern) {
                return Err(ConfigError::InvalidRule {
                    id: rule.name.clone(),
                    reason: format!("Invalid regex pattern: {}", e),
                });
            }
        }
    }

    for policy in &config.matching.domain_policies {
        if policy.domain.is_empty() {
            return Err(ConfigError::Validation {
                message: "Domain policy with empty domain".to_string(),
            });
        }
        if let UnmatchedPolicy::AdmitRelaxed { threshold } = policy.policy {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::Validation {
                    message: format!(
                        "Relaxed threshold for '{}' must be within [0, 1], got {}",
                        policy.domain, threshold
                    ),
                });
            }
        }
    }

    for (field, variants) in &config.labels.synonyms {
        if KpiField::parse(field).is_none() {
            return Err(ConfigError::UnknownField {
                context: "labels.synonyms".to_string(),
                field: field.clone(),
            });
        }
        if variants.iter().all(|v| v.trim().is_empty()) {
            return Err(ConfigError::Validation {
                message: format!("labels.synonyms.{} has no label variants", field),
            });
        }
    }

    if config.extraction.oracle.enabled && config.extraction.oracle.endpoint.is_none() {
        return Err(ConfigError::Validation {
            message: "extraction.oracle.enabled requires an endpoint".to_string(),
        });
    }

    if config.sink.batch_size == 0 || config.sink.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "sink.batch_size and sink.max_attempts must be positive".to_string(),
        });
    }

    Ok(())
}

fn validate_patterns(patterns: &[String], name: &str) -> Result<(), ConfigError> {
    for pattern in patterns {
        if let Err(e) = Regex::new(pattern) {
            return Err(ConfigError::InvalidPattern {
                name: name.to_string(),
                reason: e.to_string(),
            });
        }
    }
    Ok(())
}

/// Short stable hash of the effective configuration, logged per run so
/// records can be traced back to the rule set that produced them.
pub fn fingerprint(config: &TriageConfig) -> String {
    let serialized = serde_json::to_string(config).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    serialized.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
