//! Vision extraction backend over an OpenAI-compatible chat endpoint.
//!
//! Sends one rendered page image per request and asks the model for
//! structured markdown. Quota exhaustion (HTTP 429 or an
//! `insufficient_quota` error body) is reported as a distinct outcome so
//! the fallback chain can stop calling the backend for the rest of the
//! run instead of burning a failed request per page.

use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::types::{ExtractionError, VerificationService, VisionExtractionService, VisionOutcome};
use crate::config;

// ──────────────────────────────────────────────
// Prompts
// ──────────────────────────────────────────────

const SYSTEM_PROMPT: &str = "\
You are a document text extractor. Extract ALL visible text from the \
provided page image, preserving structure as Markdown. Output headers, \
tables, lists, and paragraphs. Be thorough and accurate.";

const USER_PROMPT: &str = "\
Extract all visible text from this page image as structured Markdown. \
Preserve tables using Markdown table syntax and headers using # syntax. \
Output only the extracted content.";

const VERIFY_SYSTEM_PROMPT: &str = "\
You are a proofreader for OCR output. Fix character-level recognition \
errors (confused letters, broken words, stray symbols) without changing \
wording, structure, or Markdown markup. Output only the corrected text.";

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

// ──────────────────────────────────────────────
// Client
// ──────────────────────────────────────────────

/// Blocking client for an OpenAI-compatible vision chat endpoint.
pub struct OpenAiVisionClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiVisionClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config::PAGE_CALL_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn build_request(&self, page_image: &[u8]) -> ChatRequest<'_> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(page_image);
        let image_url = format!("data:image/png;base64,{encoded}");
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: serde_json::Value::String(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: serde_json::json!([
                        { "type": "text", "text": USER_PROMPT },
                        { "type": "image_url", "image_url": { "url": image_url } },
                    ]),
                },
            ],
            max_tokens: 4096,
        }
    }

    fn build_verify_request(&self, content: &str) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: serde_json::Value::String(VERIFY_SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: serde_json::Value::String(content.to_string()),
                },
            ],
            max_tokens: 4096,
        }
    }
}

impl VisionExtractionService for OpenAiVisionClient {
    fn name(&self) -> &str {
        "vision_api"
    }

    fn extract_page(&self, page_image: &[u8], page: u32) -> VisionOutcome {
        let _span = tracing::info_span!(
            "vision_extract",
            model = %self.model,
            page,
            image_size = page_image.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let request = self.build_request(page_image);
        let response = match self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
        {
            Ok(r) => r,
            Err(e) => {
                return VisionOutcome::Failed {
                    reason: format!("request failed: {e}"),
                }
            }
        };

        let status = response.status();
        let body = response.text().unwrap_or_default();

        if status.as_u16() == 429 || body_signals_quota(&body) {
            return VisionOutcome::QuotaExceeded;
        }
        if !status.is_success() {
            return VisionOutcome::Failed {
                reason: format!("backend returned {status}"),
            };
        }

        let parsed: ChatResponse = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => {
                return VisionOutcome::Failed {
                    reason: format!("unparseable response: {e}"),
                }
            }
        };
        let markdown = match parsed.choices.into_iter().next() {
            Some(choice) => choice.message.content,
            None => {
                return VisionOutcome::Failed {
                    reason: "response contained no choices".to_string(),
                }
            }
        };

        tracing::info!(
            model = %self.model,
            page,
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = markdown.len(),
            "vision extraction complete"
        );
        VisionOutcome::Success { markdown }
    }
}

impl VerificationService for OpenAiVisionClient {
    fn verify(&self, content: &str, page: u32) -> Result<String, ExtractionError> {
        let _span = tracing::info_span!(
            "llm_verify",
            model = %self.model,
            page,
            content_len = content.len(),
        )
        .entered();

        let request = self.build_verify_request(content);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| ExtractionError::VisionTransport(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(ExtractionError::VisionTransport(format!(
                "backend returned {status}"
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ExtractionError::VisionTransport(format!("unparseable response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                ExtractionError::VisionTransport("response contained no choices".to_string())
            })
    }
}

/// Quota exhaustion signalled in the error body rather than the status
/// line. Some gateways return 400 with an `insufficient_quota` code.
fn body_signals_quota(body: &str) -> bool {
    if let Ok(err) = serde_json::from_str::<ApiErrorResponse>(body) {
        if err.error.code.as_deref() == Some("insufficient_quota") {
            return true;
        }
        if err.error.message.contains("insufficient_quota")
            || err.error.message.contains("quota")
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_code_in_error_body_is_detected() {
        let body = r#"{"error":{"code":"insufficient_quota","message":"You exceeded your current quota"}}"#;
        assert!(body_signals_quota(body));
    }

    #[test]
    fn quota_mention_in_message_is_detected() {
        let body = r#"{"error":{"message":"monthly quota exhausted"}}"#;
        assert!(body_signals_quota(body));
    }

    #[test]
    fn ordinary_error_body_is_not_quota() {
        let body = r#"{"error":{"code":"invalid_request_error","message":"bad image"}}"#;
        assert!(!body_signals_quota(body));
        assert!(!body_signals_quota("not json"));
    }

    #[test]
    fn verify_request_carries_no_image() {
        let client = OpenAiVisionClient::new("https://api.example.com/v1", "key", "gpt-vision");
        let request = client.build_verify_request("s0me ocr text");
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("s0me ocr text"));
        assert!(!json.contains("image_url"));
    }

    #[test]
    fn request_embeds_image_as_data_url() {
        let client = OpenAiVisionClient::new("https://api.example.com/v1", "key", "gpt-vision");
        let request = client.build_request(&[1, 2, 3]);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("data:image/png;base64,"));
        assert!(json.contains("gpt-vision"));
    }
}
