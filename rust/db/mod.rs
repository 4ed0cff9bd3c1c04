//! Storage layer: the `Warehouse` contract plus SQLite and PostgreSQL backends.
//!
//! A warehouse holds both the business tables the generated SQL runs against
//! and the bookkeeping tables (metadata index, golden queries, query history).

pub mod connection;
pub mod postgres;
pub mod schema;
pub mod seed;
pub mod sqlite;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use connection::connect;
pub use postgres::PostgresWarehouse;
pub use sqlite::SqliteWarehouse;

/// One result row, column name to JSON value, in select-list order.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn display_name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "PostgreSQL",
            Dialect::Sqlite => "SQLite",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}

/// Row of the `metadata_index` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub table_name: String,
    pub column_name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub business_term: Option<String>,
    pub data_type: Option<String>,
    pub is_metric: bool,
    pub metric_definition: Option<String>,
    pub example_values: Option<String>,
}

/// Row of the `golden_queries` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenQuery {
    pub id: i64,
    pub question: String,
    pub sql_query: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Values written to `query_history` for one chat request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewHistoryEntry {
    pub user_question: String,
    pub generated_sql: Option<String>,
    pub execution_result: Option<String>,
    pub confidence_score: Option<f64>,
    pub trust_score: Option<f64>,
    pub agent_used: Option<String>,
    pub error_message: Option<String>,
    pub execution_time_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub question: String,
    pub sql: Option<String>,
    pub agent_used: Option<String>,
    pub confidence_score: Option<f64>,
    pub trust_score: Option<f64>,
    pub error: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub is_reviewed: bool,
    pub review_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything the agents and the chat pipeline need from a database.
#[async_trait]
pub trait Warehouse: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Run one read-only statement, aborting it once `timeout` elapses.
    async fn run_query(&self, sql: &str, timeout: Duration) -> Result<Vec<Row>>;

    /// Run administrative statements (DDL, seed inserts) in one transaction.
    async fn run_statements(&self, statements: &[String]) -> Result<()>;

    async fn table_names(&self) -> Result<Vec<String>>;

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    async fn metadata_for_table(&self, table: &str) -> Result<Vec<MetadataEntry>>;

    /// Entries whose business term, description or display name contains
    /// `term`, ignoring case.
    async fn search_metadata(&self, term: &str) -> Result<Vec<MetadataEntry>>;

    async fn active_golden_queries(&self) -> Result<Vec<GoldenQuery>>;

    async fn record_history(&self, entry: &NewHistoryEntry) -> Result<i64>;

    /// Newest first.
    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryEntry>>;

    /// Returns false when no history row has this id.
    async fn mark_reviewed(&self, id: i64, feedback: &str) -> Result<bool>;
}

/// Double-quote an identifier for either dialect.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape a string literal for inline SQL.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Wraps `%term%` for LIKE patterns, escaping the wildcard characters.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("trips"), "\"trips\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("O'Hare"), "'O''Hare'");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("usnc"), "%usnc%");
        assert_eq!(like_pattern("100%_x"), "%100\\%\\_x%");
    }
}
