//! Chat-completions triage classifier.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::schema::LlmEndpoint;
use crate::error::CollaboratorError;
use crate::kpi::KpiField;
use crate::llm::{parse_json_object, ChatClient, ChatMessage};
use crate::scoring::Candidate;
use crate::text::truncate_chars;

use super::{TriageClassifier, TriageLabel, TriageResult};

const SYSTEM_PROMPT: &str = "\
You triage email that no known reporting source claimed. Classify the message \
into exactly one label:
- financial_report: recurring operating numbers (cash, revenue, pipeline, occupancy, closings, orders)
- deal_discussion: acquisitions, financing, term sheets, negotiations
- legal_noise: contracts, notices, compliance, signatures
- operational: staffing, scheduling, facilities, vendors
- unknown: none of the above

Respond only with JSON: {\"label\": \"...\", \"confidence\": 0.0-1.0, \
\"reasoning\": \"one sentence\", \"has_kpi_data\": true|false, \
\"suggested_kpis\": [\"cash\", ...]}";

const MAX_TOKENS: u32 = 200;

pub struct LlmTriageClassifier {
    client: ChatClient,
    body_chars: usize,
}

impl LlmTriageClassifier {
    pub fn new(
        endpoint: &LlmEndpoint,
        timeout: Duration,
        body_chars: usize,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: ChatClient::from_endpoint(endpoint, timeout)?,
            body_chars,
        })
    }

    fn user_prompt(&self, candidate: &Candidate) -> String {
        let message = &candidate.message;
        let attachments = message.attachment_names();
        let attachments = if attachments.is_empty() {
            "(none)".to_string()
        } else {
            attachments.join(", ")
        };
        format!(
            "FROM: {}\nSUBJECT: {}\nBODY:\n{}\nATTACHMENT NAMES: {}",
            message.sender.address,
            message.subject,
            truncate_chars(&message.body, self.body_chars),
            attachments
        )
    }
}

/// Reads a triage result out of a parsed response object.
pub(crate) fn result_from_json(map: &Map<String, Value>) -> TriageResult {
    let label = map
        .get("label")
        .and_then(Value::as_str)
        .map(TriageLabel::parse)
        .unwrap_or(TriageLabel::Unknown);
    let suggested_kpis = map
        .get("suggested_kpis")
        .and_then(Value::as_array)
        .map(|items| {
            let mut fields: Vec<KpiField> = items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(KpiField::parse)
                .collect();
            fields.dedup();
            fields
        })
        .unwrap_or_default();
    TriageResult {
        label,
        confidence: map
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0),
        reasoning: map
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        has_kpi_data: map
            .get("has_kpi_data")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        suggested_kpis,
    }
}

#[async_trait]
impl TriageClassifier for LlmTriageClassifier {
    async fn classify(&self, candidate: &Candidate) -> Result<TriageResult, CollaboratorError> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(self.user_prompt(candidate)),
        ];
        let raw = self.client.complete(&messages, Some(MAX_TOKENS)).await?;
        let map = parse_json_object(&raw).ok_or_else(|| {
            CollaboratorError::InvalidResponse(format!(
                "triage response was not a JSON object: {}",
                crate::sanitize::truncate_snippet(&raw, 120)
            ))
        })?;
        Ok(result_from_json(&map))
    }
}
