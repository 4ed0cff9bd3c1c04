//! SQL Agent
//!
//! Builds a metadata context, asks the gateway for one SELECT, then validates
//! and runs it.

use crate::db::{Dialect, Row, Warehouse};
use crate::error::{FinchError, Result};
use crate::llm::{AiGateway, Completion, GenerateRequest, ProviderKind};
use crate::metadata::MetadataService;
use crate::security::QueryValidator;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

lazy_static! {
    static ref FENCED_SQL: Regex = Regex::new(r"(?is)```sql\n(.*?)\n```").expect("fenced sql pattern");
    static ref FENCED_SELECT: Regex =
        Regex::new(r"(?is)```\n(SELECT.*?)\n```").expect("fenced select pattern");
    static ref EXPLANATION: Regex =
        Regex::new(r"(?is)Explanation:\s*(.+?)(?:\n\n|Confidence:|$)").expect("explanation pattern");
}

pub const NO_EXPLANATION: &str = "No explanation provided";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlAgentResponse {
    pub sql: Option<String>,
    pub explanation: Option<String>,
    pub confidence_score: f64,
    pub results: Option<Vec<Row>>,
    pub error: Option<String>,
    pub row_count: Option<usize>,
    pub ai_provider: Option<ProviderKind>,
    pub ai_model: Option<String>,
    pub ai_tokens: Option<u64>,
    pub tables_used: Vec<String>,
}

impl SqlAgentResponse {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

pub struct SqlAgent {
    gateway: Arc<AiGateway>,
    metadata: Arc<MetadataService>,
    warehouse: Arc<dyn Warehouse>,
    validator: QueryValidator,
}

impl SqlAgent {
    pub fn new(
        gateway: Arc<AiGateway>,
        metadata: Arc<MetadataService>,
        warehouse: Arc<dyn Warehouse>,
        validator: QueryValidator,
    ) -> Self {
        Self {
            gateway,
            metadata,
            warehouse,
            validator,
        }
    }

    /// Never fails; problems are reported in `error`.
    pub async fn generate_and_execute(&self, question: &str, model: Option<ProviderKind>) -> SqlAgentResponse {
        match self.run(question, model).await {
            Ok(response) => response,
            Err(e) => {
                error!("SQL agent error: {}", e);
                SqlAgentResponse::failed(e.to_string())
            }
        }
    }

    async fn run(&self, question: &str, model: Option<ProviderKind>) -> Result<SqlAgentResponse> {
        info!("Building knowledge context...");
        let context = self.metadata.build_context_for_query(question).await?;

        info!("Generating SQL query...");
        let completion = self.generate_sql(question, &context, model).await?;
        let reply = completion.text.as_str();

        let explanation = extract_explanation(reply);
        let confidence = confidence_from_reply(reply);

        let Some(sql) = extract_sql(reply) else {
            return Ok(SqlAgentResponse {
                explanation: Some("Could not generate valid SQL".to_string()),
                error: Some("SQL generation failed".to_string()),
                ..SqlAgentResponse::default()
            });
        };

        if let Err(rejection) = self.validator.validate(&sql) {
            warn!("Generated SQL rejected: {}", rejection);
            return Ok(SqlAgentResponse {
                sql: Some(sql),
                explanation: Some(explanation),
                error: Some(FinchError::from(rejection).to_string()),
                ..SqlAgentResponse::default()
            });
        }

        let tables_used = self.validator.extract_table_names(&sql);
        info!("Executing SQL: {}", sql);
        match self.validator.execute_safe(self.warehouse.as_ref(), &sql).await {
            Ok(rows) => Ok(SqlAgentResponse {
                row_count: Some(rows.len()),
                results: Some(rows),
                sql: Some(sql),
                explanation: Some(explanation),
                confidence_score: confidence,
                error: None,
                ai_provider: Some(completion.provider),
                ai_model: Some(completion.model),
                ai_tokens: Some(completion.tokens),
                tables_used,
            }),
            Err(e) => Ok(SqlAgentResponse {
                sql: Some(sql),
                explanation: Some(explanation),
                confidence_score: confidence,
                error: Some(e.to_string()),
                tables_used,
                ..SqlAgentResponse::default()
            }),
        }
    }

    async fn generate_sql(&self, question: &str, context: &str, model: Option<ProviderKind>) -> Result<Completion> {
        let request = GenerateRequest::new(format!(
            "{}\n\nUser Question: {}\n\nGenerate the SQL query now.",
            context, question
        ))
        .with_system(system_prompt(self.warehouse.dialect()))
        .with_temperature(0.3)
        .with_max_tokens(1000);

        self.gateway.generate(&request, model).await
    }
}

fn system_prompt(dialect: Dialect) -> String {
    let db = dialect.display_name();
    format!(
        r#"You are an expert SQL query generator for a {db} database.

You will receive:
1. Database context with table descriptions, metrics, and business terms
2. A user question

Your task:
- Generate a SINGLE {db} SELECT query
- Use the flattened analytics tables when possible (trip_metrics_daily, region_revenue_summary)
- Always resolve business terms (e.g., USNC -> code in regions table)
- Include appropriate JOINs with regions table when needed
- Add date filters when relevant

Return your response in this EXACT format:

```sql
[YOUR SQL QUERY HERE]
```

Explanation: [Brief explanation of what the query does]

Confidence: [High/Medium/Low]

IMPORTANT:
- Query must be a valid {db} SELECT statement
- Use explicit column names, not SELECT *
- Add LIMIT if counting many rows
- Prefer aggregated tables over raw data"#
    )
}

/// Fenced ```sql block, then a fenced block starting with SELECT, then the
/// lines from the first SELECT up to the first line ending in `;`.
pub fn extract_sql(reply: &str) -> Option<String> {
    if let Some(caps) = FENCED_SQL.captures(reply) {
        return Some(caps[1].trim().to_string());
    }
    if let Some(caps) = FENCED_SELECT.captures(reply) {
        return Some(caps[1].trim().to_string());
    }

    let mut lines = Vec::new();
    let mut in_sql = false;
    for line in reply.lines() {
        if line.to_uppercase().contains("SELECT") {
            in_sql = true;
        }
        if in_sql {
            lines.push(line);
            if line.trim_end().ends_with(';') {
                break;
            }
        }
    }

    let sql = lines.join("\n").trim().to_string();
    (!sql.is_empty()).then_some(sql)
}

pub fn extract_explanation(reply: &str) -> String {
    EXPLANATION
        .captures(reply)
        .map(|caps| caps[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_EXPLANATION.to_string())
}

/// High 0.9, Medium 0.7, Low 0.4; Medium when the reply does not say.
pub fn confidence_from_reply(reply: &str) -> f64 {
    let lower = reply.to_lowercase();
    if lower.contains("confidence: high") {
        0.9
    } else if lower.contains("confidence: medium") {
        0.7
    } else if lower.contains("confidence: low") {
        0.4
    } else {
        0.7
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced_sql() {
        let reply = "```sql\nSELECT SUM(total_revenue) FROM region_revenue_summary;\n```\n\nExplanation: Sums revenue.\n\nConfidence: High";
        assert_eq!(
            extract_sql(reply).unwrap(),
            "SELECT SUM(total_revenue) FROM region_revenue_summary;"
        );
        assert_eq!(extract_explanation(reply), "Sums revenue.");
        assert_eq!(confidence_from_reply(reply), 0.9);
    }

    #[test]
    fn test_extract_plain_fence_and_bare_select() {
        let reply = "Here you go:\n```\nselect id\nfrom trips\n```";
        assert_eq!(extract_sql(reply).unwrap(), "select id\nfrom trips");

        let reply = "The query is\nSELECT name\nFROM drivers\nLIMIT 5;\nThat should work.";
        assert_eq!(extract_sql(reply).unwrap(), "SELECT name\nFROM drivers\nLIMIT 5;");

        assert!(extract_sql("I cannot answer that.").is_none());
    }

    #[test]
    fn test_explanation_stops_at_confidence() {
        let reply = "Explanation: Counts trips Confidence: low";
        assert_eq!(extract_explanation(reply), "Counts trips");
        assert_eq!(confidence_from_reply(reply), 0.4);
        assert_eq!(extract_explanation("nothing here"), NO_EXPLANATION);
        assert_eq!(confidence_from_reply("nothing here"), 0.7);
    }

    #[test]
    fn test_system_prompt_names_dialect() {
        assert!(system_prompt(Dialect::Sqlite).contains("a SQLite database"));
        assert!(system_prompt(Dialect::Postgres).contains("valid PostgreSQL SELECT"));
    }
}
