//! Draft source rules for senders that keep landing in quarantine.
//!
//! Drafts are never applied automatically. They are emitted as YAML in the
//! `sources:` shape of the matching config so an operator can review them,
//! assign the entity and paste them in.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::schema::SourceRule;
use crate::db::{triage_repo, Database, DatabaseError};
use crate::error::ConfigError;
use crate::kpi::KpiField;

use super::TriageLabel;

/// Entity placeholder on every draft.
pub const UNASSIGNED_ENTITY: &str = "unassigned";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuggestOptions {
    /// Financial-report messages a domain needs before it earns a draft.
    pub min_messages: usize,
    pub min_confidence: f64,
}

impl Default for SuggestOptions {
    fn default() -> Self {
        Self {
            min_messages: 2,
            min_confidence: 0.6,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RuleDrafts {
    pub sources: Vec<SourceRule>,
}

#[derive(Default)]
struct DomainGroup {
    messages: usize,
    senders: BTreeSet<String>,
    kpis: BTreeSet<KpiField>,
}

/// Groups persisted `financial_report` triage results by sender domain and
/// drafts one rule per recurring domain. Domains already named by an
/// existing rule are skipped.
pub fn suggest_source_rules(
    db: &Database,
    existing: &[SourceRule],
    options: SuggestOptions,
) -> Result<Vec<SourceRule>, DatabaseError> {
    let covered: BTreeSet<String> = existing
        .iter()
        .flat_map(|r| r.from_domains.iter().map(|d| d.to_ascii_lowercase()))
        .collect();

    let rows = triage_repo::find_promotable(
        db,
        TriageLabel::FinancialReport.as_str(),
        options.min_confidence,
    )?;

    let mut groups: BTreeMap<String, DomainGroup> = BTreeMap::new();
    for row in rows {
        let Some(sender) = row.sender.as_deref().map(str::to_ascii_lowercase) else {
            continue;
        };
        let Some((_, domain)) = sender.split_once('@') else {
            continue;
        };
        if domain.is_empty() || covered.contains(domain) {
            continue;
        }
        let group = groups.entry(domain.to_string()).or_default();
        group.messages += 1;
        group.kpis.extend(row.suggested_kpis.split(',').filter_map(KpiField::parse));
        group.senders.insert(sender.clone());
    }

    let drafts: Vec<SourceRule> = groups
        .into_iter()
        .filter(|(_, g)| g.messages >= options.min_messages)
        .map(|(domain, group)| draft_rule(&domain, group))
        .collect();
    tracing::info!(drafts = drafts.len(), "Drafted source rules from quarantine triage");
    Ok(drafts)
}

fn draft_rule(domain: &str, group: DomainGroup) -> SourceRule {
    SourceRule {
        name: format!("suggested-{}", domain.replace('.', "-")),
        entity: UNASSIGNED_ENTITY.to_string(),
        report_type: "kpi".to_string(),
        priority: 0,
        match_threshold: None,
        confidence_weight: 1.0,
        from_addresses: group.senders.into_iter().collect(),
        from_domains: vec![domain.to_string()],
        subject_patterns: Vec::new(),
        body_keywords: Vec::new(),
        attachment_types: Vec::new(),
        filename_patterns: Vec::new(),
        expected_kpis: group.kpis.into_iter().collect(),
    }
}

pub fn drafts_to_yaml(rules: &[SourceRule]) -> Result<String, ConfigError> {
    let drafts = RuleDrafts {
        sources: rules.to_vec(),
    };
    Ok(serde_yaml::to_string(&drafts)?)
}
