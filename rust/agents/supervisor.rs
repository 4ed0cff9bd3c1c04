//! Supervisor: classifies a question and hands it to the right agent.

use super::doc_agent::DocAgent;
use super::sql_agent::SqlAgent;
use super::{AgentReply, Intent};
use crate::llm::{AiGateway, GenerateRequest, ProviderKind};
use std::sync::Arc;
use tracing::{info, warn};

const CLASSIFIER_PROMPT: &str = r#"You are a query classifier for a ride-sharing analytics system.

Your task is to classify the user's question into one of these categories:

1. SQL_QUERY: Questions asking for data, metrics, statistics, counts, revenue, etc.
   Examples:
   - "What is the total revenue for USNC last month?"
   - "How many trips were completed yesterday?"
   - "Show me top drivers by earnings"

2. DOCUMENTATION: Questions asking for explanations, definitions, how things work.
   Examples:
   - "What does USNC mean?"
   - "Explain surge pricing"
   - "What tables are available?"

Respond with ONLY one word: SQL_QUERY or DOCUMENTATION"#;

pub struct Supervisor {
    gateway: Arc<AiGateway>,
    sql_agent: SqlAgent,
    doc_agent: DocAgent,
}

impl Supervisor {
    pub fn new(gateway: Arc<AiGateway>, sql_agent: SqlAgent, doc_agent: DocAgent) -> Self {
        Self {
            gateway,
            sql_agent,
            doc_agent,
        }
    }

    /// Falls back to [`Intent::SqlQuery`] when the classifier is unsure or
    /// unreachable.
    pub async fn classify(&self, question: &str, model: Option<ProviderKind>) -> Intent {
        let request = GenerateRequest::new(question)
            .with_system(CLASSIFIER_PROMPT)
            .with_temperature(0.3)
            .with_max_tokens(50);

        match self.gateway.generate(&request, model).await {
            Ok(completion) => intent_from_reply(&completion.text),
            Err(e) => {
                warn!("Classification failed, defaulting to SQL: {}", e);
                Intent::SqlQuery
            }
        }
    }

    pub async fn route(&self, question: &str, model: Option<ProviderKind>) -> AgentReply {
        let intent = self.classify(question, model).await;
        info!("Query classified as: {:?}", intent);

        match intent {
            Intent::SqlQuery => AgentReply::Sql(self.sql_agent.generate_and_execute(question, model).await),
            Intent::Documentation => AgentReply::Doc(self.doc_agent.answer_question(question, model).await),
        }
    }
}

pub fn intent_from_reply(reply: &str) -> Intent {
    let upper = reply.trim().to_uppercase();
    if upper.contains("SQL") {
        Intent::SqlQuery
    } else if upper.contains("DOC") {
        Intent::Documentation
    } else {
        Intent::SqlQuery
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_from_reply() {
        assert_eq!(intent_from_reply("SQL_QUERY"), Intent::SqlQuery);
        assert_eq!(intent_from_reply(" documentation\n"), Intent::Documentation);
        assert_eq!(intent_from_reply("doc"), Intent::Documentation);
        assert_eq!(intent_from_reply("no idea"), Intent::SqlQuery);
    }
}
