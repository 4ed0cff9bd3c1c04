//! PostgreSQL warehouse backed by a sqlx connection pool.

use super::{ColumnInfo, Dialect, GoldenQuery, HistoryEntry, MetadataEntry, NewHistoryEntry, Row, Warehouse};
use crate::error::{FinchError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row as _, TypeInfo};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

const METADATA_COLUMNS: &str = "table_name, column_name, display_name, description, business_term, \
     data_type, is_metric, metric_definition, example_values";

pub struct PostgresWarehouse {
    pool: PgPool,
}

impl PostgresWarehouse {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a pool and check it with a trivial query.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| FinchError::Database(format!("Failed to connect to PostgreSQL: {}", e)))?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        info!("PostgreSQL pool ready");
        Ok(Self::new(pool))
    }

}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn run_query(&self, sql: &str, timeout: Duration) -> Result<Vec<Row>> {
        let timeout_ms = timeout.as_millis().max(1);
        let work = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;
            sqlx::query(&format!("SET LOCAL statement_timeout = {}", timeout_ms))
                .execute(&mut *tx)
                .await?;

            let result = sqlx::query(sql).fetch_all(&mut *tx).await;
            tx.rollback().await?;

            let rows = result.map_err(|e| match &e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some("57014") => {
                    FinchError::Timeout(timeout)
                }
                _ => FinchError::Database(e.to_string()),
            })?;
            Ok::<_, FinchError>(rows.iter().map(row_to_json).collect())
        };

        // statement_timeout is enforced server side; the outer guard covers
        // pool acquisition and network stalls.
        match tokio::time::timeout(timeout + Duration::from_secs(1), work).await {
            Ok(result) => result,
            Err(_) => Err(FinchError::Timeout(timeout)),
        }
    }

    async fn run_statements(&self, statements: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in statements {
            sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(statement)).await.map_err(|e| {
                FinchError::Database(format!("Statement failed: {} ({})", e, preview(statement)))
            })?;
        }
        tx.commit().await?;
        debug!("Applied {} statements", statements.len());
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("table_name").map_err(FinchError::from))
            .collect()
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT column_name::text AS column_name,
                   data_type::text AS data_type,
                   is_nullable::text AS is_nullable
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ColumnInfo {
                    name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    nullable: row.try_get::<String, _>("is_nullable")? == "YES",
                })
            })
            .collect()
    }

    async fn metadata_for_table(&self, table: &str) -> Result<Vec<MetadataEntry>> {
        let sql = format!(
            "SELECT {} FROM metadata_index WHERE table_name = $1 ORDER BY id",
            METADATA_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(table).fetch_all(&self.pool).await?;
        rows.iter().map(metadata_from_row).collect()
    }

    async fn search_metadata(&self, term: &str) -> Result<Vec<MetadataEntry>> {
        let sql = format!(
            r"SELECT {} FROM metadata_index
              WHERE business_term ILIKE $1 ESCAPE '\'
                 OR description ILIKE $1 ESCAPE '\'
                 OR display_name ILIKE $1 ESCAPE '\'
              ORDER BY id",
            METADATA_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(super::like_pattern(term))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(metadata_from_row).collect()
    }

    async fn active_golden_queries(&self) -> Result<Vec<GoldenQuery>> {
        let rows = sqlx::query(
            r#"
            SELECT id, question, sql_query, description, category
            FROM golden_queries
            WHERE is_active = TRUE
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(GoldenQuery {
                    id: row.try_get::<i32, _>("id")? as i64,
                    question: row.try_get("question")?,
                    sql_query: row.try_get("sql_query")?,
                    description: row.try_get("description")?,
                    category: row.try_get("category")?,
                })
            })
            .collect()
    }

    async fn record_history(&self, entry: &NewHistoryEntry) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO query_history
            (user_question, generated_sql, execution_result, confidence_score, trust_score,
             agent_used, error_message, execution_time_ms, is_reviewed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE)
            RETURNING id
            "#,
        )
        .bind(&entry.user_question)
        .bind(&entry.generated_sql)
        .bind(&entry.execution_result)
        .bind(entry.confidence_score)
        .bind(entry.trust_score)
        .bind(&entry.agent_used)
        .bind(&entry.error_message)
        .bind(elapsed_ms_column(entry.execution_time_ms))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<i32, _>("id")? as i64)
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_question, generated_sql, agent_used, confidence_score, trust_score,
                   error_message, execution_time_ms, is_reviewed, review_feedback, created_at
            FROM query_history
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(HistoryEntry {
                    id: row.try_get::<i32, _>("id")? as i64,
                    question: row.try_get("user_question")?,
                    sql: row.try_get("generated_sql")?,
                    agent_used: row.try_get("agent_used")?,
                    confidence_score: row.try_get("confidence_score")?,
                    trust_score: row.try_get("trust_score")?,
                    error: row.try_get("error_message")?,
                    execution_time_ms: row
                        .try_get::<Option<i32>, _>("execution_time_ms")?
                        .map(i64::from),
                    is_reviewed: row.try_get::<Option<bool>, _>("is_reviewed")?.unwrap_or(false),
                    review_feedback: row.try_get("review_feedback")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn mark_reviewed(&self, id: i64, feedback: &str) -> Result<bool> {
        let Some(id) = history_id_column(id) else {
            return Ok(false);
        };
        let result = sqlx::query(
            "UPDATE query_history SET is_reviewed = TRUE, review_feedback = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(feedback)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// History ids are SERIAL; a wider id cannot name any row.
fn history_id_column(id: i64) -> Option<i32> {
    i32::try_from(id).ok()
}

/// `execution_time_ms` is an INTEGER column.
fn elapsed_ms_column(ms: i64) -> i32 {
    i32::try_from(ms.max(0)).unwrap_or(i32::MAX)
}

fn metadata_from_row(row: &PgRow) -> Result<MetadataEntry> {
    Ok(MetadataEntry {
        table_name: row.try_get("table_name")?,
        column_name: row.try_get("column_name")?,
        display_name: row.try_get("display_name")?,
        description: row.try_get("description")?,
        business_term: row.try_get("business_term")?,
        data_type: row.try_get("data_type")?,
        is_metric: row.try_get::<Option<bool>, _>("is_metric")?.unwrap_or(false),
        metric_definition: row.try_get("metric_definition")?,
        example_values: row.try_get("example_values")?,
    })
}

/// Decode a row by the server-reported column type.
fn row_to_json(row: &PgRow) -> Row {
    let mut map = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.type_info().name()).unwrap_or_else(|e| {
            warn!("Failed to decode column {} ({}): {}", column.name(), column.type_info().name(), e);
            Value::Null
        });
        map.insert(column.name().to_string(), value);
    }
    map
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> std::result::Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map(|f| float_value(f as f64)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(float_value),
        "NUMERIC" => row
            .try_get::<Option<bigdecimal::BigDecimal>, _>(idx)?
            .map(|d| match d.to_string().parse::<f64>() {
                Ok(f) => float_value(f),
                Err(_) => Value::String(d.to_string()),
            }),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(|d| Value::String(d.to_string())),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)?
            .map(|t| Value::String(t.to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|ts| Value::String(ts.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|ts| Value::String(ts.to_rfc3339())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx)?,
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(idx)?
            .map(|u| Value::String(u.to_string())),
        _ => row.try_get::<Option<String>, _>(idx)?.map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn preview(statement: &str) -> String {
    let flat: String = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    flat.chars().take(120).collect()
}
