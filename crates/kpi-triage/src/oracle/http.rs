//! Chat-completions oracle.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::schema::LlmEndpoint;
use crate::error::CollaboratorError;
use crate::kpi::KpiField;
use crate::llm::{parse_json_object, ChatClient, ChatMessage};
use crate::text::truncate_chars;

use super::{ExtractionOracle, FieldProposal, OracleRequest, OracleResponse};

const SYSTEM_PROMPT: &str = "\
You are a financial-data extraction assistant. Your only job is to pull KPI \
numbers from the text the user provides.

Rules:
1. Extract only values that are actual, current operating metrics reported by \
the sender. Ignore legal references, slide numbers, footnotes and marketing copy.
2. For multi-column statements pick the most recent reporting period.
3. Monetary values are plain numbers (no currency sign, no commas, no 1.2M shorthand).
4. Occupancy is a decimal between 0 and 1.
5. Count fields are integers.
6. Ignore targets, goals, budgets and figures describing third parties in deal talk.
7. Return null for any field without a legitimate value.
8. Give a short evidence_line (exact snippet) and a confidence between 0.0 and 1.0 per value.

Respond only with valid JSON, no markdown fences, no commentary.";

pub struct HttpOracle {
    client: ChatClient,
    max_excerpt_chars: usize,
}

impl HttpOracle {
    pub fn new(
        endpoint: &LlmEndpoint,
        timeout: Duration,
        max_excerpt_chars: usize,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: ChatClient::from_endpoint(endpoint, timeout)?,
            max_excerpt_chars,
        })
    }

    fn user_prompt(&self, request: &OracleRequest<'_>) -> String {
        let excerpt = truncate_chars(request.excerpt, self.max_excerpt_chars);
        let schema = request
            .fields
            .iter()
            .map(|f| {
                format!(
                    "  \"{}\": {{\"value\": <number|null>, \"evidence_line\": \"<string|null>\", \"confidence\": <float>}}",
                    f
                )
            })
            .collect::<Vec<_>>()
            .join(",\n");
        format!(
            "Extract KPI values from this document text.\n\nDOCUMENT TEXT (first {} chars):\n---\n{}\n---\n\nReturn a JSON object with this exact structure:\n{{\n{}\n}}",
            self.max_excerpt_chars, excerpt, schema
        )
    }
}

/// Reads per-field proposals out of a parsed response object.
pub(crate) fn proposals_from_json(map: &Map<String, Value>, fields: &[KpiField]) -> Vec<FieldProposal> {
    fields
        .iter()
        .filter_map(|field| {
            let entry = map.get(field.as_str())?.as_object()?;
            let value = match entry.get("value") {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.replace([',', '$'], "").trim().parse::<f64>().ok(),
                _ => None,
            };
            let evidence = entry
                .get("evidence_line")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let confidence = entry
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            Some(FieldProposal {
                field: *field,
                value,
                evidence,
                confidence,
            })
        })
        .collect()
}

#[async_trait]
impl ExtractionOracle for HttpOracle {
    async fn propose(&self, request: &OracleRequest<'_>) -> OracleResponse {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(self.user_prompt(request)),
        ];
        let raw = match self.client.complete(&messages, None).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(document = %request.document, error = %e, "Oracle call failed");
                return OracleResponse::Unavailable(e.to_string());
            }
        };
        match parse_json_object(&raw) {
            Some(map) => OracleResponse::Proposals(proposals_from_json(&map, request.fields)),
            None => {
                tracing::warn!(
                    document = %request.document,
                    raw = %crate::sanitize::truncate_snippet(&raw, 200),
                    "Oracle response was not a JSON object"
                );
                OracleResponse::Unavailable("unparseable oracle response".to_string())
            }
        }
    }
}
