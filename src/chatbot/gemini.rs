//! Gemini API client for text generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chatbot::credentials::{BackendError, GenerationBackend};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// One Gemini client bound to one API key.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    code: Option<u16>,
    message: String,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self, reqwest::Error> {
        Self::with_base_url(api_key, GEMINI_API_BASE.to_string())
    }

    /// Point the client at a different endpoint (proxies, test servers).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            api_key,
            base_url,
            client,
        })
    }
}

/// Pull the readable message out of an error body, falling back to the raw body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => body.to_string(),
    }
}

/// Concatenate all text parts of the first candidate.
fn extract_text(parsed: GenerateResponse) -> Result<String, BackendError> {
    if let Some(error) = parsed.error {
        return Err(BackendError::new(error.code, error.message));
    }

    let text = parsed
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    Ok(text)
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, BackendError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let url = format!("{}/{}:generateContent", self.base_url, model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::new(e.status().map(|s| s.as_u16()), format!("HTTP error: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::new(Some(status.as_u16()), format!("Failed to read response: {e}")))?;

        debug!("Gemini response status: {status}");

        if !status.is_success() {
            return Err(BackendError::new(Some(status.as_u16()), error_message(&body)));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::new(None, format!("Failed to parse response: {e}")))?;

        extract_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> GenerateResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = r#"{
            "candidates": [
                { "content": { "parts": [ { "text": "Day 1 is " }, { "text": "build day." } ] } },
                { "content": { "parts": [ { "text": "ignored" } ] } }
            ]
        }"#;
        assert_eq!(extract_text(parse(body)).unwrap(), "Day 1 is build day.");
    }

    #[test]
    fn test_extract_text_empty_candidates() {
        assert_eq!(extract_text(parse(r#"{ "candidates": [] }"#)).unwrap(), "");
        assert_eq!(extract_text(parse(r#"{}"#)).unwrap(), "");
        // Safety-blocked candidates come back without content
        assert_eq!(extract_text(parse(r#"{ "candidates": [ {} ] }"#)).unwrap(), "");
    }

    #[test]
    fn test_extract_text_inline_error() {
        let body = r#"{ "error": { "code": 429, "message": "Resource has been exhausted" } }"#;
        let err = extract_text(parse(body)).unwrap_err();
        assert_eq!(err.status, Some(429));
        assert!(err.is_rate_limit());
    }

    #[test]
    fn test_error_message_from_envelope() {
        let body = r#"{ "error": { "code": 404, "message": "models/gemini-x is not found", "status": "NOT_FOUND" } }"#;
        assert_eq!(error_message(body), "models/gemini-x is not found");
        assert_eq!(error_message("plain failure"), "plain failure");
    }
}
