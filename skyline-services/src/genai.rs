//! Minimal client for the generative-language REST endpoint.
//!
//! Covers exactly what the services need: one-shot `generateContent` calls
//! with an optional JSON response schema. Streaming and chat history are the
//! session engine's business, not this client's.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, thiserror::Error)]
pub enum GenAiError {
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint returned status {0}")]
    Status(u16),
    #[error("empty response (finish reason: {finish_reason:?})")]
    Empty { finish_reason: Option<String> },
}

/// Per-call generation knobs. `Default` sends none of them.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub response_mime_type: Option<String>,
    pub response_schema: Option<Value>,
}

/// Text reply plus the metadata error mapping needs.
#[derive(Debug, Clone)]
pub struct GenerateReply {
    pub text: String,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Part {
    text: Option<String>,
}

/// Blocking client; the services are request/response, not streaming.
pub struct GenAiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl GenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Point at a non-default endpoint (tests, staging).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// One-shot text generation.
    ///
    /// # Errors
    /// `GenAiError::Status` for non-2xx replies, `GenAiError::Empty` when
    /// the model produced no text (the finish reason says why).
    pub fn generate_content(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerateReply, GenAiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let mut generation_config = serde_json::Map::new();
        if let Some(t) = options.temperature {
            generation_config.insert("temperature".into(), json!(t));
        }
        if let Some(max) = options.max_output_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(max));
        }
        if let Some(mime) = &options.response_mime_type {
            generation_config.insert("responseMimeType".into(), json!(mime));
        }
        if let Some(schema) = &options.response_schema {
            generation_config.insert("responseSchema".into(), schema.clone());
        }

        let mut body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        debug!(model, "generateContent request");
        let response = self.http.post(&url).json(&body).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenAiError::Status(status.as_u16()));
        }

        let parsed: GenerateResponse = response.json()?;
        let candidate = parsed.candidates.into_iter().next();
        let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
        let text = candidate
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GenAiError::Empty { finish_reason });
        }
        Ok(GenerateReply {
            text,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parsing_joins_text_parts() {
        let raw = r#"{
            "candidates": [{
                "content": { "parts": [{ "text": "hello " }, { "text": "world" }] },
                "finishReason": "STOP"
            }]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let candidate = parsed.candidates.into_iter().next().unwrap();
        let text: String = candidate
            .content
            .unwrap()
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        assert_eq!(text, "hello world");
        assert_eq!(candidate.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn response_parsing_tolerates_missing_content() {
        let raw = r#"{ "candidates": [{ "finishReason": "SAFETY" }] }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let candidate = parsed.candidates.into_iter().next().unwrap();
        assert!(candidate.content.is_none());
        assert_eq!(candidate.finish_reason.as_deref(), Some("SAFETY"));
    }
}
