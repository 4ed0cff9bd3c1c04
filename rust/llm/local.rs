//! Offline stand-in for a locally hosted model.

use super::provider::{word_count, Completion, GenerateRequest, LlmProvider, ProviderKind};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

pub const LOCAL_MODEL: &str = "local-stub";

const SQL_REPLY: &str = "```sql\nSELECT COUNT(*) as total_count\nFROM trips\nWHERE status = 'completed';\n```\n\nThis query counts all completed trips.";

const PLAIN_REPLY: &str =
    "I am a local model stub. In production, I would generate a real response based on a local LLM.";

pub struct LocalStub {
    delay: Duration,
}

impl Default for LocalStub {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl LocalStub {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl LlmProvider for LocalStub {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn complete(&self, request: &GenerateRequest) -> Result<Completion> {
        info!("Using local model (stub)");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let prompt = request.prompt.to_lowercase();
        let text = if prompt.contains("sql") || prompt.contains("query") {
            SQL_REPLY
        } else {
            PLAIN_REPLY
        };

        Ok(Completion::new(
            text.to_string(),
            ProviderKind::Local,
            LOCAL_MODEL,
            word_count(text),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sql_prompts_get_canned_query() {
        let stub = LocalStub::new(Duration::ZERO);
        let completion = stub
            .complete(&GenerateRequest::new("Write a SQL query for trips"))
            .await
            .unwrap();
        assert!(completion.text.starts_with("```sql\nSELECT COUNT(*)"));
        assert_eq!(completion.model, LOCAL_MODEL);
        assert_eq!(completion.tokens, word_count(SQL_REPLY));

        let completion = stub.complete(&GenerateRequest::new("hello")).await.unwrap();
        assert_eq!(completion.text, PLAIN_REPLY);
    }
}
