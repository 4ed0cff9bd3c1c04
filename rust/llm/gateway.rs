//! AI Gateway
//!
//! One entry point over every configured provider: primary first, then the
//! remaining providers in fixed order, with whole-call retries and usage
//! accounting.

use super::gemini::GeminiClient;
use super::local::LocalStub;
use super::openai::ChatCompletionsClient;
use super::provider::{Completion, GenerateRequest, LlmProvider, ProviderKind};
use crate::config::AppConfig;
use crate::error::{FinchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Exponential back-off between whole-gateway attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub multiplier: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            multiplier: Duration::from_secs(1),
            min_wait: Duration::from_secs(2),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            multiplier: Duration::ZERO,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }

    /// Wait before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.multiplier
            .saturating_mul(factor)
            .clamp(self.min_wait, self.max_wait.max(self.min_wait))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub requests: u64,
    pub tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub total_tokens: u64,
    pub by_provider: BTreeMap<String, ProviderUsage>,
}

pub struct AiGateway {
    providers: HashMap<ProviderKind, Arc<dyn LlmProvider>>,
    default_provider: ProviderKind,
    retry: RetryPolicy,
    usage: Mutex<UsageStats>,
}

impl AiGateway {
    /// Empty gateway; register providers with [`AiGateway::with_provider`].
    pub fn new(default_provider: ProviderKind) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider,
            retry: RetryPolicy::default(),
            usage: Mutex::new(UsageStats::default()),
        }
    }

    /// All four providers; those without a key fail with "not configured".
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.default_provider)
            .with_provider(Arc::new(ChatCompletionsClient::groq(
                config.groq_api_key.clone(),
                config.llm_timeout,
            )))
            .with_provider(Arc::new(ChatCompletionsClient::openai(
                config.openai_api_key.clone(),
                config.llm_timeout,
            )))
            .with_provider(Arc::new(GeminiClient::new(
                config.google_api_key.clone(),
                config.llm_timeout,
            )))
            .with_provider(Arc::new(LocalStub::new(config.local_model_delay)))
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.default_provider
    }

    /// Generate with `model` (or the default provider) and fall back on failure.
    pub async fn generate(&self, request: &GenerateRequest, model: Option<ProviderKind>) -> Result<Completion> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.generate_once(request, model).await {
                Ok(completion) => return Ok(completion),
                Err(e) if attempt < attempts => {
                    let wait = self.retry.backoff(attempt);
                    warn!(
                        "Gateway attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, e, wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn generate_once(&self, request: &GenerateRequest, model: Option<ProviderKind>) -> Result<Completion> {
        let start = Instant::now();
        let primary = model.unwrap_or(self.default_provider);

        let primary_error = match self.call_provider(primary, request).await {
            Ok(mut completion) => {
                completion.duration = start.elapsed();
                self.track_usage(primary, completion.tokens);
                return Ok(completion);
            }
            Err(e) => {
                error!("Error with primary model {}: {}", primary, e);
                e
            }
        };

        for fallback in Self::fallback_order(primary) {
            info!("Trying fallback: {}", fallback);
            match self.call_provider(fallback, request).await {
                Ok(mut completion) => {
                    completion.duration = start.elapsed();
                    completion.fallback_used = true;
                    self.track_usage(fallback, completion.tokens);
                    return Ok(completion);
                }
                Err(e) => error!("Fallback {} failed: {}", fallback, e),
            }
        }

        Err(FinchError::Llm(format!(
            "All AI providers failed. Last error: {}",
            primary_error
        )))
    }

    async fn call_provider(&self, kind: ProviderKind, request: &GenerateRequest) -> Result<Completion> {
        let provider = self
            .providers
            .get(&kind)
            .ok_or_else(|| FinchError::Llm(format!("Provider {} is not registered", kind)))?;
        provider.complete(request).await
    }

    /// Every provider except `primary`, in the fixed fallback order.
    pub fn fallback_order(primary: ProviderKind) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .iter()
            .copied()
            .filter(|kind| *kind != primary)
            .collect()
    }

    fn track_usage(&self, kind: ProviderKind, tokens: u64) {
        let mut usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        usage.total_requests += 1;
        usage.total_tokens += tokens;
        let entry = usage.by_provider.entry(kind.to_string()).or_default();
        entry.requests += 1;
        entry.tokens += tokens;
    }

    pub fn usage_stats(&self) -> UsageStats {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        kind: ProviderKind,
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn ok(kind: ProviderKind, reply: &'static str) -> Arc<Self> {
            Arc::new(Self { kind, reply: Some(reply), calls: AtomicUsize::new(0) })
        }

        fn failing(kind: ProviderKind) -> Arc<Self> {
            Arc::new(Self { kind, reply: None, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl LlmProvider for Fixed {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn complete(&self, _request: &GenerateRequest) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(text) => Ok(Completion::new(text.to_string(), self.kind, "fixed", 10)),
                None => Err(FinchError::Llm(format!("{} API key not configured", self.kind))),
            }
        }
    }

    #[tokio::test]
    async fn test_primary_success_tracks_usage() {
        let gateway = AiGateway::new(ProviderKind::Groq)
            .with_provider(Fixed::ok(ProviderKind::Groq, "hi"))
            .with_retry(RetryPolicy::none());

        let completion = gateway.generate(&GenerateRequest::new("q"), None).await.unwrap();
        assert_eq!(completion.provider, ProviderKind::Groq);
        assert!(!completion.fallback_used);

        let usage = gateway.usage_stats();
        assert_eq!(usage.total_requests, 1);
        assert_eq!(usage.total_tokens, 10);
        assert_eq!(usage.by_provider["groq"], ProviderUsage { requests: 1, tokens: 10 });
    }

    #[tokio::test]
    async fn test_falls_back_in_order() {
        let openai = Fixed::failing(ProviderKind::OpenAi);
        let gemini = Fixed::ok(ProviderKind::Gemini, "from gemini");
        let local = Fixed::ok(ProviderKind::Local, "from local");
        let gateway = AiGateway::new(ProviderKind::Groq)
            .with_provider(Fixed::failing(ProviderKind::Groq))
            .with_provider(openai.clone())
            .with_provider(gemini.clone())
            .with_provider(local.clone())
            .with_retry(RetryPolicy::none());

        let completion = gateway.generate(&GenerateRequest::new("q"), None).await.unwrap();
        assert_eq!(completion.text, "from gemini");
        assert!(completion.fallback_used);
        assert_eq!(openai.calls.load(Ordering::SeqCst), 1);
        assert_eq!(local.calls.load(Ordering::SeqCst), 0);

        // failures are not counted
        let usage = gateway.usage_stats();
        assert_eq!(usage.total_requests, 1);
        assert!(usage.by_provider.get("groq").is_none());
    }

    #[tokio::test]
    async fn test_explicit_model_overrides_default() {
        let gateway = AiGateway::new(ProviderKind::Groq)
            .with_provider(Fixed::ok(ProviderKind::Groq, "groq"))
            .with_provider(Fixed::ok(ProviderKind::Local, "local"))
            .with_retry(RetryPolicy::none());

        let completion = gateway
            .generate(&GenerateRequest::new("q"), Some(ProviderKind::Local))
            .await
            .unwrap();
        assert_eq!(completion.text, "local");
        assert!(!completion.fallback_used);
    }

    #[tokio::test]
    async fn test_all_fail_names_primary_error() {
        let groq = Fixed::failing(ProviderKind::Groq);
        let gateway = AiGateway::new(ProviderKind::Groq)
            .with_provider(groq.clone())
            .with_retry(RetryPolicy { attempts: 2, ..RetryPolicy::none() });

        let err = gateway.generate(&GenerateRequest::new("q"), None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "LLM error: All AI providers failed. Last error: LLM error: groq API key not configured"
        );
        assert_eq!(groq.calls.load(Ordering::SeqCst), 2);
        assert_eq!(gateway.usage_stats(), UsageStats::default());
    }

    #[test]
    fn test_fallback_order_and_backoff() {
        assert_eq!(
            AiGateway::fallback_order(ProviderKind::OpenAi),
            vec![ProviderKind::Groq, ProviderKind::Gemini, ProviderKind::Local]
        );

        let retry = RetryPolicy::default();
        assert_eq!(retry.backoff(1), Duration::from_secs(2));
        assert_eq!(retry.backoff(3), Duration::from_secs(4));
        assert_eq!(retry.backoff(10), Duration::from_secs(10));
    }
}
