//! Google Gemini `generateContent` client.

use super::provider::{word_count, Completion, GenerateRequest, LlmProvider, ProviderKind};
use crate::error::{FinchError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Clone)]
pub struct GeminiClient {
    api_key: Option<String>,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: GEMINI_MODEL.to_string(),
            client,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LlmProvider for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn complete(&self, request: &GenerateRequest) -> Result<Completion> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FinchError::Llm("Google API key not configured".to_string()))?;

        // Gemini has no system role here; the system prompt is prepended.
        let full_prompt = request.combined_prompt();
        let body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": full_prompt}]}],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            }
        });

        debug!("Calling Gemini model {}", self.model);
        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| FinchError::Llm(format!("Gemini API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(FinchError::Llm(format!("Gemini API error ({}): {}", status, error_text)));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| FinchError::Llm(format!("Failed to parse Gemini response: {}", e)))?;

        parse_generate_content(&self.model, &full_prompt, &response_json)
    }
}

pub(crate) fn parse_generate_content(model: &str, full_prompt: &str, response_json: &Value) -> Result<Completion> {
    let parts = response_json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| FinchError::Llm(format!("No candidates in Gemini response: {}", response_json)))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");
    if text.is_empty() {
        return Err(FinchError::Llm("Empty content in Gemini response".to_string()));
    }

    let tokens = response_json
        .pointer("/usageMetadata/totalTokenCount")
        .and_then(|t| t.as_u64())
        .unwrap_or_else(|| word_count(full_prompt) + word_count(&text));

    Ok(Completion::new(text, ProviderKind::Gemini, model, tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_estimates_tokens_from_words() {
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "Hello "}, {"text": "there"}]}}]
        });
        let completion = parse_generate_content(GEMINI_MODEL, "one two three", &body).unwrap();
        assert_eq!(completion.text, "Hello there");
        assert_eq!(completion.tokens, 5);
        assert_eq!(completion.model, GEMINI_MODEL);
    }

    #[test]
    fn test_parse_prefers_reported_usage() {
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "ok"}]}}],
            "usageMetadata": {"totalTokenCount": 17}
        });
        assert_eq!(parse_generate_content(GEMINI_MODEL, "p", &body).unwrap().tokens, 17);
        assert!(parse_generate_content(GEMINI_MODEL, "p", &serde_json::json!({})).is_err());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let err = GeminiClient::new(None, Duration::from_secs(1))
            .complete(&GenerateRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Google API key not configured"));
    }
}
