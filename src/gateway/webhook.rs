//! Webhook adapters for the classification and answer automations
//!
//! Both gateways return either structured JSON or free text, with no contract
//! guaranteeing either. The body is always read as text first and normalized
//! here, so nothing duck-typed ever reaches the engine.
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{AnswerGateway, ClassificationGateway, SOURCE_TAG};
use crate::error::SessionError;
use crate::models::{
    AnswerRecord, ClassificationResult, Selection, DEFAULT_CATEGORY, DEFAULT_CONFIDENCE, SENTINEL,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

fn build_client() -> Client {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(8)
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client")
}

async fn post_for_text(client: &Client, url: &str, payload: &impl Serialize) -> crate::Result<String> {
    let response = client.post(url).json(payload).send().await.map_err(|e| {
        error!("Webhook request failed: {}", e);
        SessionError::Gateway(format!("transport error: {}", e))
    })?;

    let status = response.status();
    if !status.is_success() {
        error!("Webhook returned non-success status: {}", status);
        return Err(SessionError::Gateway(format!("HTTP status {}", status)));
    }

    // Never assume a content-type; the automations reply with whatever
    // the last scenario step produced.
    response
        .text()
        .await
        .map_err(|e| SessionError::Gateway(format!("body read error: {}", e)))
}

//
// ================= Classification =================
//

#[derive(Debug, Serialize)]
struct ClassifyPayload<'a> {
    question: &'a str,
    timestamp: String,
    source: &'static str,
}

/// Classification webhook client.
pub struct ClassificationWebhook {
    client: Client,
    url: String,
}

impl ClassificationWebhook {
    pub fn new(url: String) -> Self {
        Self {
            client: build_client(),
            url,
        }
    }
}

#[async_trait]
impl ClassificationGateway for ClassificationWebhook {
    async fn classify(&self, question: &str) -> crate::Result<ClassificationResult> {
        let payload = ClassifyPayload {
            question,
            timestamp: chrono::Utc::now().to_rfc3339(),
            source: SOURCE_TAG,
        };

        info!("Calling classification webhook");
        let body = post_for_text(&self.client, &self.url, &payload).await?;

        Ok(normalize_classification(question, &body))
    }
}

/// Normalize a classification body: structured JSON keeps its named fields,
/// anything else is treated as the category itself.
pub fn normalize_classification(question: &str, body: &str) -> ClassificationResult {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if value.is_object() {
            let category = value
                .get("category")
                .or_else(|| value.get("keyword"))
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string();
            let confidence = value
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_CONFIDENCE);

            return ClassificationResult {
                question: question.to_string(),
                category,
                confidence,
            };
        }
    }

    let text = body.trim();
    ClassificationResult {
        question: question.to_string(),
        category: if text.is_empty() {
            DEFAULT_CATEGORY.to_string()
        } else {
            text.to_string()
        },
        confidence: DEFAULT_CONFIDENCE,
    }
}

//
// ================= Answer =================
//

#[derive(Debug, Serialize)]
struct AnswerPayload<'a> {
    question: &'a str,
    amount: String,
    procedure: &'static str,
    timestamp: String,
    source: &'static str,
    category: &'a str,
    confidence: u8,
}

/// Answer webhook client.
pub struct AnswerWebhook {
    client: Client,
    url: String,
}

impl AnswerWebhook {
    pub fn new(url: String) -> Self {
        Self {
            client: build_client(),
            url,
        }
    }
}

#[async_trait]
impl AnswerGateway for AnswerWebhook {
    async fn answer(
        &self,
        classification: &ClassificationResult,
        selection: &Selection,
    ) -> crate::Result<AnswerRecord> {
        let payload = AnswerPayload {
            question: &classification.question,
            amount: selection.amount_won.to_string(),
            procedure: selection.procedure.label(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            source: SOURCE_TAG,
            category: &classification.category,
            confidence: classification.confidence_percent(),
        };

        info!("Calling answer webhook");
        let body = post_for_text(&self.client, &self.url, &payload).await?;

        Ok(normalize_answer(&body))
    }
}

/// Normalize an answer body. Structured JSON maps the known field names with
/// sentinel fills for any missing key; a bare acknowledgement or empty body
/// becomes a fully sentinel-filled record; any other text is kept as the
/// explanation. Parse failures never propagate.
pub fn normalize_answer(body: &str) -> AnswerRecord {
    let text = body.trim();
    if text.is_empty() || text == "Accepted" {
        return AnswerRecord::sentinel();
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.is_object() {
            let field = |key: &str| {
                value
                    .get(key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(SENTINEL)
                    .to_string()
            };
            return AnswerRecord::Structured {
                approval_line: field("결재라인"),
                regulation_reference: field("참고규정항목"),
                explanation: field("설명"),
            };
        }
    }

    AnswerRecord::Structured {
        approval_line: SENTINEL.to_string(),
        regulation_reference: SENTINEL.to_string(),
        explanation: text.to_string(),
    }
}
