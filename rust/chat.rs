//! Chat pipeline: rate limit, route, validate, record history.
//!
//! `ChatService` is the single entry point the CLI (or any other front end)
//! talks to. Everything it returns is serde-serializable.

use crate::agents::{
    AgentReply, DocAgent, SqlAgent, SqlAgentResponse, Supervisor, ValidationOutcome, ValidatorAgent,
};
use crate::config::AppConfig;
use crate::db::schema::{FLATTENED_TABLES, TRANSACTIONAL_TABLES};
use crate::db::{self, quote_ident, ColumnInfo, HistoryEntry, NewHistoryEntry, Row, Warehouse};
use crate::error::{FinchError, Result};
use crate::llm::{AiGateway, ProviderKind, UsageStats};
use crate::metadata::MetadataService;
use crate::security::{QueryValidator, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const MAX_STORED_RESULT_CHARS: usize = 5000;
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const PREVIEW_ROWS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    /// Overrides the default provider for every LLM call of this request.
    #[serde(default)]
    pub model: Option<ProviderKind>,
}

impl ChatRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: ProviderKind) -> Self {
        self.model = Some(model);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub request_id: String,
    pub question: String,
    pub agent_used: String,
    pub sql: Option<String>,
    pub explanation: Option<String>,
    pub answer: Option<String>,
    pub results: Option<Vec<Row>>,
    pub row_count: Option<usize>,
    pub confidence_score: Option<f64>,
    pub trust_score: Option<f64>,
    pub validation_notes: Vec<String>,
    pub sources: Vec<String>,
    pub tables_used: Vec<String>,
    pub ai_provider: Option<ProviderKind>,
    pub ai_model: Option<String>,
    pub error: Option<String>,
    pub execution_time_ms: i64,
    pub history_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Flattened,
    Transactional,
    Unknown,
}

impl TableKind {
    pub fn of(table: &str) -> Self {
        if FLATTENED_TABLES.contains(&table) {
            TableKind::Flattened
        } else if TRANSACTIONAL_TABLES.contains(&table) {
            TableKind::Transactional
        } else {
            TableKind::Unknown
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub row_count: i64,
    #[serde(rename = "type")]
    pub kind: TableKind,
}

impl TableSummary {
    fn from_count(name: String, count: Result<i64>) -> Self {
        match count {
            Ok(row_count) => Self {
                kind: TableKind::of(&name),
                name,
                row_count,
            },
            Err(e) => {
                warn!("Could not count rows of {}: {}", name, e);
                Self {
                    name,
                    row_count: 0,
                    kind: TableKind::Unknown,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePreview {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    pub sample_data: Vec<Row>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    pub total_users: i64,
    pub total_drivers: i64,
    pub total_trips: i64,
    pub total_queries: i64,
    pub ai_usage: UsageStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub database: String,
    pub dialect: db::Dialect,
    pub default_provider: ProviderKind,
    pub configured_providers: Vec<ProviderKind>,
}

pub struct ChatService {
    warehouse: Arc<dyn Warehouse>,
    gateway: Arc<AiGateway>,
    supervisor: Supervisor,
    validator_agent: ValidatorAgent,
    rate_limiter: RateLimiter,
    query_validator: QueryValidator,
    configured_providers: Vec<ProviderKind>,
}

impl ChatService {
    pub fn new(config: &AppConfig, warehouse: Arc<dyn Warehouse>, gateway: Arc<AiGateway>) -> Self {
        let query_validator = QueryValidator::new(config.query_timeout);
        let metadata = Arc::new(MetadataService::new(warehouse.clone()));

        let sql_agent = SqlAgent::new(
            gateway.clone(),
            metadata.clone(),
            warehouse.clone(),
            query_validator.clone(),
        );
        let doc_agent = DocAgent::new(gateway.clone(), metadata);
        let supervisor = Supervisor::new(gateway.clone(), sql_agent, doc_agent);
        let validator_agent = ValidatorAgent::new(warehouse.clone(), query_validator.clone());

        Self {
            warehouse,
            gateway,
            supervisor,
            validator_agent,
            rate_limiter: RateLimiter::new(config.max_requests_per_minute, config.rate_window),
            query_validator,
            configured_providers: config.configured_providers(),
        }
    }

    /// Connect to `config.database_url` and register every provider.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let warehouse = db::connect(&config.database_url).await?;
        let gateway = Arc::new(AiGateway::from_config(config));
        Ok(Self::new(config, warehouse, gateway))
    }

    pub fn warehouse(&self) -> &Arc<dyn Warehouse> {
        &self.warehouse
    }

    pub async fn chat(&self, request: &ChatRequest, client_id: &str) -> Result<ChatResponse> {
        self.rate_limiter.check(client_id)?;

        let request_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        info!(request_id = %request_id, "Chat request: {}", request.question);

        let reply = self.supervisor.route(&request.question, request.model).await;
        let agent = reply.agent();

        let mut response = ChatResponse {
            request_id,
            question: request.question.clone(),
            agent_used: agent.to_string(),
            sql: None,
            explanation: None,
            answer: None,
            results: None,
            row_count: None,
            confidence_score: None,
            trust_score: None,
            validation_notes: Vec::new(),
            sources: Vec::new(),
            tables_used: Vec::new(),
            ai_provider: None,
            ai_model: None,
            error: None,
            execution_time_ms: 0,
            history_id: None,
        };

        match reply {
            AgentReply::Sql(sql) => {
                if let Some(outcome) = self.validate_reply(&request.question, &sql).await {
                    response.trust_score = Some(outcome.trust_score);
                    response.validation_notes = outcome.validation_notes;
                }
                response.sql = sql.sql;
                response.explanation = sql.explanation;
                response.row_count = sql.row_count;
                response.results = sql.results;
                response.confidence_score = Some(sql.confidence_score);
                response.tables_used = sql.tables_used;
                response.ai_provider = sql.ai_provider;
                response.ai_model = sql.ai_model;
                response.error = sql.error;
            }
            AgentReply::Doc(doc) => {
                response.answer = Some(doc.answer);
                response.sources = doc.sources;
                response.error = doc.error;
            }
        }

        response.execution_time_ms = start.elapsed().as_millis() as i64;
        response.history_id = self.record(&response).await;
        Ok(response)
    }

    /// Replies that ran SQL without error get scored, including empty results.
    async fn validate_reply(&self, question: &str, reply: &SqlAgentResponse) -> Option<ValidationOutcome> {
        if reply.error.is_some() {
            return None;
        }
        let sql = reply.sql.as_deref()?;
        let rows = reply.results.as_deref()?;
        Some(self.validator_agent.validate(question, sql, rows).await)
    }

    async fn record(&self, response: &ChatResponse) -> Option<i64> {
        let execution_result = match (&response.results, &response.answer) {
            (Some(rows), _) => serde_json::to_string(rows).ok(),
            (None, Some(answer)) => Some(answer.clone()),
            (None, None) => None,
        }
        .map(|text| truncate_chars(&text, MAX_STORED_RESULT_CHARS));

        let entry = NewHistoryEntry {
            user_question: response.question.clone(),
            generated_sql: response.sql.clone(),
            execution_result,
            confidence_score: response.confidence_score,
            trust_score: response.trust_score,
            agent_used: Some(response.agent_used.clone()),
            error_message: response.error.clone(),
            execution_time_ms: response.execution_time_ms,
        };

        match self.warehouse.record_history(&entry).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to record query history: {}", e);
                None
            }
        }
    }

    /// A table whose row count cannot be read is listed as empty and unknown.
    pub async fn tables(&self) -> Result<Vec<TableSummary>> {
        let mut tables = Vec::new();
        for name in self.warehouse.table_names().await? {
            let count = self.count_rows(&name).await;
            tables.push(TableSummary::from_count(name, count));
        }
        Ok(tables)
    }

    pub async fn table_preview(&self, table: &str) -> Result<TablePreview> {
        let known = self.warehouse.table_names().await?;
        if !known.iter().any(|name| name == table) {
            return Err(FinchError::NotFound(format!("Table '{}'", table)));
        }

        let columns = self.warehouse.table_columns(table).await?;
        let sample_data = self
            .warehouse
            .run_query(
                &format!("SELECT * FROM {} LIMIT {}", quote_ident(table), PREVIEW_ROWS),
                self.query_validator.timeout(),
            )
            .await?;

        Ok(TablePreview {
            table_name: table.to_string(),
            columns,
            sample_data,
        })
    }

    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<HistoryEntry>> {
        self.warehouse
            .recent_history(limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
            .await
    }

    pub async fn request_review(&self, history_id: i64, feedback: &str) -> Result<()> {
        if self.warehouse.mark_reviewed(history_id, feedback).await? {
            info!("History entry {} marked for review", history_id);
            Ok(())
        } else {
            Err(FinchError::NotFound(format!("Query history entry {}", history_id)))
        }
    }

    pub async fn stats(&self) -> Result<StatsReport> {
        Ok(StatsReport {
            total_users: self.count_rows("users").await?,
            total_drivers: self.count_rows("drivers").await?,
            total_trips: self.count_rows("trips").await?,
            total_queries: self.count_rows("query_history").await?,
            ai_usage: self.gateway.usage_stats(),
        })
    }

    /// Never fails; a broken database shows up in `database`.
    pub async fn health(&self) -> HealthReport {
        let database = match self
            .warehouse
            .run_query("SELECT 1 AS ok", self.query_validator.timeout())
            .await
        {
            Ok(_) => "connected".to_string(),
            Err(e) => {
                warn!("Health check failed: {}", e);
                format!("error: {}", e)
            }
        };

        HealthReport {
            status: if database == "connected" { "healthy" } else { "degraded" }.to_string(),
            database,
            dialect: self.warehouse.dialect(),
            default_provider: self.gateway.default_provider(),
            configured_providers: self.configured_providers.clone(),
        }
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let rows = self
            .warehouse
            .run_query(
                &format!("SELECT COUNT(*) AS row_count FROM {}", quote_ident(table)),
                self.query_validator.timeout(),
            )
            .await?;

        Ok(rows
            .first()
            .and_then(|row| row.get("row_count"))
            .and_then(count_value)
            .unwrap_or(0))
    }
}

fn count_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
