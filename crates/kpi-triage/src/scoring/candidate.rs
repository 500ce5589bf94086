//! Admission scoring.
//!
//! Each signal contributes its configured weight to one running total. With
//! default weights the score is exactly: trusted sender +3, trusted domain +2,
//! reporting subject +2, KPI body signature +2, deny domain -5, meeting -3,
//! newsletter -3. A message is admitted at `score >= admission_threshold`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::schema::ScoringConfig;
use crate::error::ConfigError;
use crate::message::Message;
use crate::sanitize::mask_address;
use crate::scoring::{domain_listed, AttachmentGate};
use crate::text::{compile_patterns, contains_term, truncate_chars};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreReason {
    pub code: String,
    pub weight: i32,
}

impl fmt::Display for ScoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:+})", self.code, self.weight)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub score: i32,
    /// Every contributing signal, in evaluation order, kept even on rejection.
    pub reasons: Vec<ScoreReason>,
    pub admitted: bool,
}

impl CandidateScore {
    pub fn has(&self, code: &str) -> bool {
        self.reasons.iter().any(|r| r.code == code)
    }

    pub fn reason_codes(&self) -> Vec<&str> {
        self.reasons.iter().map(|r| r.code.as_str()).collect()
    }

    /// `trusted_sender(+3);subject_hit(+2)`
    pub fn reasons_summary(&self) -> String {
        self.reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub message: Message,
    pub score: CandidateScore,
}

fn numeric_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d+(?:[.,]\d+)*").unwrap_or_else(|e| panic!("static regex: {e}"))
    })
}

const MONEY_OR_PERCENT: [&str; 5] = ["$", "%", "€", "£", "usd"];

pub struct CandidateScorer {
    config: ScoringConfig,
    subject_patterns: Vec<Regex>,
    meeting_patterns: Vec<Regex>,
    digest_patterns: Vec<Regex>,
    gate: AttachmentGate,
}

impl CandidateScorer {
    pub fn new(config: &ScoringConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            subject_patterns: compile_patterns(&config.subject_patterns, "scoring.subject_patterns")?,
            meeting_patterns: compile_patterns(&config.meeting_patterns, "scoring.meeting_patterns")?,
            digest_patterns: compile_patterns(
                &config.quarantine_digest_patterns,
                "scoring.quarantine_digest_patterns",
            )?,
            gate: AttachmentGate::new(&config.noise_filename_patterns)?,
            config: config.clone(),
        })
    }

    pub fn gate(&self) -> &AttachmentGate {
        &self.gate
    }

    pub fn evaluate(&self, message: Message) -> Candidate {
        let score = self.score(&message);
        Candidate { message, score }
    }

    pub fn score(&self, message: &Message) -> CandidateScore {
        let _span = tracing::debug_span!("score_candidate", message_id = %message.id).entered();

        let weights = &self.config.weights;
        let mut reasons = Vec::new();
        let mut add = |code: &str, weight: i32| {
            reasons.push(ScoreReason {
                code: code.to_string(),
                weight,
            });
        };

        let sender = &message.sender;
        if !sender.is_resolved() {
            add("sender_unresolved", 0);
        }
        if !sender.address.is_empty() && self.config.trusted_senders.contains(&sender.address) {
            add("trusted_sender", weights.trusted_sender);
        }
        if domain_listed(&sender.domain, &self.config.trusted_domains) {
            add("trusted_domain", weights.trusted_domain);
        }
        if self.subject_patterns.iter().any(|re| re.is_match(&message.subject)) {
            add("subject_hit", weights.subject);
        }

        let body = truncate_chars(&message.body, self.config.body_scan_chars).to_lowercase();
        if self.has_body_signature(&body) {
            add("body_signature", weights.body_signature);
        }

        if domain_listed(&sender.domain, &self.config.deny_domains) {
            add("deny_domain", weights.deny_domain);
        }
        if self.meeting_patterns.iter().any(|re| re.is_match(&message.subject)) {
            add("meeting_invite", weights.meeting);
        }
        if self.looks_like_newsletter(message, &body) {
            add("newsletter", weights.newsletter);
        }

        if weights.quarantine_digest != 0
            && self.digest_patterns.iter().any(|re| re.is_match(&message.subject))
        {
            add("quarantine_digest", weights.quarantine_digest);
        }
        if let Some(bonus) = self.config.folder_bonus.get(&message.folder.to_lowercase()) {
            if *bonus != 0 {
                add(&format!("folder:{}", message.folder.to_lowercase()), *bonus);
            }
        }

        let attachments = self.gate.relevant(message);
        if weights.report_attachment != 0
            && attachments.iter().any(|a| {
                a.extension()
                    .is_some_and(|ext| self.config.report_extensions.contains(&ext))
            })
        {
            add("report_attachment", weights.report_attachment);
        }
        if weights.filename_keyword != 0
            && attachments.iter().any(|a| {
                let name = a.filename.to_lowercase();
                self.config
                    .filename_keywords
                    .iter()
                    .any(|k| name.contains(&k.to_lowercase()))
            })
        {
            add("filename_keyword", weights.filename_keyword);
        }

        let score: i32 = reasons.iter().map(|r| r.weight).sum();
        let admitted = score >= self.config.admission_threshold;

        tracing::debug!(
            sender = %mask_address(&sender.address),
            score,
            admitted,
            "Candidate scored"
        );

        CandidateScore {
            score,
            reasons,
            admitted,
        }
    }

    /// At least two KPI keywords, two numeric tokens and a currency or
    /// percent marker.
    fn has_body_signature(&self, body: &str) -> bool {
        let keywords = self
            .config
            .body_kpi_keywords
            .iter()
            .filter(|k| contains_term(body, &k.to_lowercase()))
            .count();
        if keywords < 2 {
            return false;
        }
        numeric_token_re().find_iter(body).take(2).count() >= 2
            && MONEY_OR_PERCENT.iter().any(|m| body.contains(m))
    }

    fn looks_like_newsletter(&self, message: &Message, body: &str) -> bool {
        message
            .sender
            .looks_like_broadcast(&self.config.newsletter_local_parts)
            || self
                .config
                .newsletter_markers
                .iter()
                .any(|m| body.contains(&m.to_lowercase()))
    }
}
