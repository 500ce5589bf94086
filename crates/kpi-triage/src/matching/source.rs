//! Binds a candidate to a named reporting source.
//!
//! Every rule yields a score in [0, 1] from weighted predicate hits. A rule
//! counts only when its score is strictly greater than its effective
//! threshold. The winner is the highest score; ties go to the higher
//! priority, then to the earlier declaration.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::schema::{DomainPolicy, MatchingConfig, SourceRule, UnmatchedPolicy};
use crate::error::ConfigError;
use crate::kpi::KpiField;
use crate::message::Message;
use crate::scoring::{domain_listed, Candidate};
use crate::text::{compile_patterns, contains_term, truncate_chars};

const W_FROM_ADDRESS: f64 = 0.30;
const W_FROM_DOMAIN: f64 = 0.20;
const W_SUBJECT: f64 = 0.20;
const W_BODY: f64 = 0.15;
const W_ATTACHMENT_TYPE: f64 = 0.10;
const W_FILENAME: f64 = 0.05;

const BODY_SCAN_CHARS: usize = 3000;
const SCORE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleScore {
    pub rule: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceMatch {
    pub rule_name: String,
    pub entity: String,
    pub report_type: String,
    pub score: f64,
    pub expected_kpis: Vec<KpiField>,
    /// Matched through a trusted-domain relaxed threshold; validated with
    /// the weaker requirement.
    pub relaxed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(SourceMatch),
    /// No rule cleared its threshold. Scores are kept, best first, for audit.
    Quarantined { top_scores: Vec<RuleScore> },
}

impl MatchOutcome {
    pub fn matched(&self) -> Option<&SourceMatch> {
        match self {
            MatchOutcome::Matched(m) => Some(m),
            MatchOutcome::Quarantined { .. } => None,
        }
    }
}

struct CompiledRule {
    rule: SourceRule,
    subject: Vec<Regex>,
    filename: Vec<Regex>,
}

pub struct SourceMatcher {
    rules: Vec<CompiledRule>,
    default_threshold: f64,
    policies: Vec<DomainPolicy>,
}

impl SourceMatcher {
    pub fn new(config: &MatchingConfig) -> Result<Self, ConfigError> {
        let rules = config
            .sources
            .iter()
            .map(|rule| {
                let invalid = |e: ConfigError| ConfigError::InvalidRule {
                    id: rule.name.clone(),
                    reason: e.to_string(),
                };
                Ok(CompiledRule {
                    subject: compile_patterns(&rule.subject_patterns, "subject_patterns")
                        .map_err(invalid)?,
                    filename: compile_patterns(&rule.filename_patterns, "filename_patterns")
                        .map_err(invalid)?,
                    rule: rule.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            rules,
            default_threshold: config.default_threshold,
            policies: config.domain_policies.clone(),
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Matches with the global threshold, then applies the sender domain's
    /// unmatched policy if nothing cleared it.
    pub fn match_candidate(&self, candidate: &Candidate) -> MatchOutcome {
        let message = &candidate.message;
        let _span = tracing::debug_span!("match_source", message_id = %message.id).entered();

        let scores = self.score_all(message);
        if let Some(found) = self.select(&scores, self.default_threshold, false) {
            tracing::info!(
                rule = %found.rule_name,
                entity = %found.entity,
                score = found.score,
                "Source matched"
            );
            return MatchOutcome::Matched(found);
        }

        if let Some(UnmatchedPolicy::AdmitRelaxed { threshold }) =
            self.policy_for(&message.sender.domain)
        {
            if let Some(found) = self.select(&scores, *threshold, true) {
                tracing::info!(
                    rule = %found.rule_name,
                    score = found.score,
                    threshold,
                    "Source matched with relaxed threshold"
                );
                return MatchOutcome::Matched(found);
            }
        }

        let mut top_scores: Vec<RuleScore> = self
            .rules
            .iter()
            .zip(&scores)
            .map(|(r, s)| RuleScore {
                rule: r.rule.name.clone(),
                score: *s,
            })
            .collect();
        top_scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        top_scores.truncate(3);

        tracing::info!(top = ?top_scores, "No source rule matched; quarantining");
        MatchOutcome::Quarantined { top_scores }
    }

    fn policy_for(&self, domain: &str) -> Option<&UnmatchedPolicy> {
        self.policies
            .iter()
            .find(|p| domain_listed(domain, std::slice::from_ref(&p.domain)))
            .map(|p| &p.policy)
    }

    fn score_all(&self, message: &Message) -> Vec<f64> {
        let body = truncate_chars(&message.body, BODY_SCAN_CHARS).to_lowercase();
        self.rules
            .iter()
            .map(|r| score_rule(r, message, &body))
            .collect()
    }

    /// Declaration-order scan; a later rule replaces the leader only with a
    /// strictly higher score, or an equal score and strictly higher priority.
    fn select(&self, scores: &[f64], global: f64, relaxed: bool) -> Option<SourceMatch> {
        let mut best: Option<(usize, f64)> = None;
        for (index, (compiled, &score)) in self.rules.iter().zip(scores).enumerate() {
            let threshold = match compiled.rule.match_threshold {
                Some(own) => own.max(global),
                None => global,
            };
            if score <= threshold + SCORE_EPSILON {
                continue;
            }
            let replace = match best {
                None => true,
                Some((leader, leader_score)) => {
                    score > leader_score + SCORE_EPSILON
                        || ((score - leader_score).abs() <= SCORE_EPSILON
                            && compiled.rule.priority > self.rules[leader].rule.priority)
                }
            };
            if replace {
                best = Some((index, score));
            }
        }

        best.map(|(index, score)| {
            let rule = &self.rules[index].rule;
            SourceMatch {
                rule_name: rule.name.clone(),
                entity: rule.entity.clone(),
                report_type: rule.report_type.clone(),
                score,
                expected_kpis: rule.expected_kpis.clone(),
                relaxed,
            }
        })
    }
}

fn score_rule(compiled: &CompiledRule, message: &Message, body: &str) -> f64 {
    let rule = &compiled.rule;
    let sender = &message.sender;
    let mut score = 0.0;

    if !sender.address.is_empty() && rule.from_addresses.contains(&sender.address) {
        score += W_FROM_ADDRESS;
    }
    if !sender.domain.is_empty() && rule.from_domains.contains(&sender.domain) {
        score += W_FROM_DOMAIN;
    }
    if compiled.subject.iter().any(|re| re.is_match(&message.subject)) {
        score += W_SUBJECT;
    }
    if !rule.body_keywords.is_empty() {
        let hits = rule
            .body_keywords
            .iter()
            .filter(|k| contains_term(body, &k.to_lowercase()))
            .count();
        score += W_BODY * hits as f64 / rule.body_keywords.len() as f64;
    }
    if message.attachments.iter().any(|a| {
        rule.attachment_types.iter().any(|t| {
            let t = t.trim().to_lowercase();
            if t.contains('/') {
                a.media_type.eq_ignore_ascii_case(&t)
            } else {
                a.extension().as_deref() == Some(t.trim_start_matches('.'))
            }
        })
    }) {
        score += W_ATTACHMENT_TYPE;
    }
    if message
        .attachments
        .iter()
        .any(|a| compiled.filename.iter().any(|re| re.is_match(&a.filename)))
    {
        score += W_FILENAME;
    }

    (score * rule.confidence_weight).min(1.0)
}
