//! Chat-completions client for OpenAI and Groq (same wire protocol).

use super::provider::{word_count, Completion, GenerateRequest, LlmProvider, ProviderKind};
use crate::error::{FinchError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_MODEL: &str = "openai/gpt-oss-20b";

#[derive(Clone)]
pub struct ChatCompletionsClient {
    kind: ProviderKind,
    label: &'static str,
    api_key: Option<String>,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn openai(api_key: Option<String>, timeout: Duration) -> Self {
        Self::new(ProviderKind::OpenAi, "OpenAI", api_key, OPENAI_BASE_URL, OPENAI_MODEL, timeout)
    }

    pub fn groq(api_key: Option<String>, timeout: Duration) -> Self {
        Self::new(ProviderKind::Groq, "Groq", api_key, GROQ_BASE_URL, GROQ_MODEL, timeout)
    }

    fn new(
        kind: ProviderKind,
        label: &'static str,
        api_key: Option<String>,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            kind,
            label,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn request_body(&self, request: &GenerateRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.prompt}));

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        })
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionsClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(&self, request: &GenerateRequest) -> Result<Completion> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FinchError::Llm(format!("{} API key not configured", self.label)))?;

        debug!("Calling {} model {}", self.label, self.model);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| FinchError::Llm(format!("{} API call failed: {}", self.label, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(FinchError::Llm(format!(
                "{} API error ({}): {}",
                self.label, status, error_text
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| FinchError::Llm(format!("Failed to parse {} response: {}", self.label, e)))?;

        parse_chat_response(self.kind, &self.model, &response_json)
    }
}

/// Pull text, model and token usage out of a chat-completions response.
pub(crate) fn parse_chat_response(
    kind: ProviderKind,
    requested_model: &str,
    response_json: &Value,
) -> Result<Completion> {
    if let Some(error) = response_json.get("error") {
        return Err(FinchError::Llm(format!("LLM API error: {}", error)));
    }

    let choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| FinchError::Llm(format!("No choices in LLM response: {}", response_json)))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(FinchError::Llm(
                "LLM response was filtered by content policy".to_string(),
            ))
        }
        _ => {}
    }

    let content = choice["message"]["content"]
        .as_str()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| FinchError::Llm(format!("No content in LLM response: {}", response_json)))?;

    let model = response_json
        .get("model")
        .and_then(|m| m.as_str())
        .unwrap_or(requested_model);
    let tokens = response_json
        .pointer("/usage/total_tokens")
        .and_then(|t| t.as_u64())
        .unwrap_or_else(|| word_count(content));

    Ok(Completion::new(content.to_string(), kind, model, tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let body = serde_json::json!({
            "model": "openai/gpt-oss-20b",
            "choices": [{"message": {"content": "SELECT 1"}, "finish_reason": "stop"}],
            "usage": {"total_tokens": 42}
        });
        let completion = parse_chat_response(ProviderKind::Groq, GROQ_MODEL, &body).unwrap();
        assert_eq!(completion.text, "SELECT 1");
        assert_eq!(completion.tokens, 42);
        assert_eq!(completion.provider, ProviderKind::Groq);
        assert!(!completion.fallback_used);
    }

    #[test]
    fn test_parse_counts_words_without_usage() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "three little words"}}]
        });
        let completion = parse_chat_response(ProviderKind::OpenAi, OPENAI_MODEL, &body).unwrap();
        assert_eq!(completion.tokens, 3);
        assert_eq!(completion.model, OPENAI_MODEL);
    }

    #[test]
    fn test_parse_errors() {
        let err = serde_json::json!({"error": {"message": "bad key"}});
        assert!(parse_chat_response(ProviderKind::OpenAi, OPENAI_MODEL, &err).is_err());

        let empty = serde_json::json!({"choices": []});
        assert!(parse_chat_response(ProviderKind::OpenAi, OPENAI_MODEL, &empty).is_err());

        let filtered = serde_json::json!({
            "choices": [{"message": {"content": "x"}, "finish_reason": "content_filter"}]
        });
        assert!(parse_chat_response(ProviderKind::OpenAi, OPENAI_MODEL, &filtered).is_err());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let client = ChatCompletionsClient::groq(None, Duration::from_secs(1));
        let err = client.complete(&GenerateRequest::new("hi")).await.unwrap_err();
        assert_eq!(err.to_string(), "LLM error: Groq API key not configured");
    }

    #[test]
    fn test_request_body_includes_system_prompt() {
        let client = ChatCompletionsClient::openai(Some("k".into()), Duration::from_secs(1));
        let body = client.request_body(
            &GenerateRequest::new("q").with_system("s").with_max_tokens(50),
        );
        assert_eq!(body["model"], OPENAI_MODEL);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "q");
        assert_eq!(body["max_tokens"], 50);
    }
}
