//! Doc Agent: plain-language answers about the warehouse, no SQL.

use crate::error::Result;
use crate::llm::{AiGateway, GenerateRequest, ProviderKind};
use crate::metadata::MetadataService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

const SYSTEM_PROMPT: &str = "You are a helpful assistant explaining a ride-sharing analytics system.

Answer the user's question based on the provided context.

Rules:
- Provide clear, concise explanations
- Reference specific tables or metrics when relevant
- Do NOT generate SQL queries (that's a different agent's job)
- If you don't have enough information, say so

Keep your answer brief and informative.";

pub const SOURCES: [&str; 3] = [
    "Business term definitions",
    "Database metadata",
    "System documentation",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocAgentResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub error: Option<String>,
}

pub struct DocAgent {
    gateway: Arc<AiGateway>,
    metadata: Arc<MetadataService>,
}

impl DocAgent {
    pub fn new(gateway: Arc<AiGateway>, metadata: Arc<MetadataService>) -> Self {
        Self { gateway, metadata }
    }

    pub async fn answer_question(&self, question: &str, model: Option<ProviderKind>) -> DocAgentResponse {
        match self.answer(question, model).await {
            Ok(answer) => DocAgentResponse {
                answer,
                sources: SOURCES.iter().map(|s| s.to_string()).collect(),
                error: None,
            },
            Err(e) => {
                error!("Doc agent error: {}", e);
                DocAgentResponse {
                    answer: format!("Error generating answer: {}", e),
                    sources: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn answer(&self, question: &str, model: Option<ProviderKind>) -> Result<String> {
        info!("Answering documentation question");
        let context = self.metadata.build_doc_context(question).await?;
        let request = GenerateRequest::new(format!(
            "{}\n\nUser Question: {}\n\nProvide a helpful answer:",
            context, question
        ))
        .with_system(SYSTEM_PROMPT)
        .with_temperature(0.7)
        .with_max_tokens(500);

        let completion = self.gateway.generate(&request, model).await?;
        Ok(completion.text.trim().to_string())
    }
}
