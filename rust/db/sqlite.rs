//! SQLite warehouse backed by rusqlite.
//!
//! A single connection is shared behind a mutex; every call runs on the
//! blocking pool. Generated SQL runs with `PRAGMA query_only` switched on and
//! is interrupted when its timeout elapses.

use super::{ColumnInfo, Dialect, GoldenQuery, HistoryEntry, MetadataEntry, NewHistoryEntry, Row, Warehouse};
use crate::error::{FinchError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, InterruptHandle, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const METADATA_COLUMNS: &str = "table_name, column_name, display_name, description, business_term, \
     data_type, is_metric, metric_definition, example_values";

pub struct SqliteWarehouse {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteWarehouse {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| FinchError::Database(format!("Failed to open {}: {}", path.display(), e)))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| FinchError::Database(format!("Failed to open in-memory database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| FinchError::Database("SQLite connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| FinchError::Execution(format!("SQLite task failed: {}", e)))?
    }
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn run_query(&self, sql: &str, timeout: Duration) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        let query = self.with_conn(move |conn| {
            conn.pragma_update(None, "query_only", true)?;
            let result = collect_rows(conn, &sql);
            conn.pragma_update(None, "query_only", false)?;
            result
        });

        match tokio::time::timeout(timeout, query).await {
            Ok(result) => result,
            Err(_) => {
                warn!("SQLite query exceeded {:?}, interrupting", timeout);
                self.interrupt.interrupt();
                Err(FinchError::Timeout(timeout))
            }
        }
    }

    async fn run_statements(&self, statements: &[String]) -> Result<()> {
        let statements = statements.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for statement in &statements {
                tx.execute_batch(statement).map_err(|e| {
                    FinchError::Database(format!("Statement failed: {} ({})", e, preview(statement)))
                })?;
            }
            tx.commit()?;
            debug!("Applied {} statements", statements.len());
            Ok(())
        })
        .await
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT name, type, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid")?;
            let columns = stmt
                .query_map(params![table], |row| {
                    Ok(ColumnInfo {
                        name: row.get(0)?,
                        data_type: row.get(1)?,
                        nullable: row.get::<_, i64>(2)? == 0,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(columns)
        })
        .await
    }

    async fn metadata_for_table(&self, table: &str) -> Result<Vec<MetadataEntry>> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM metadata_index WHERE table_name = ?1 ORDER BY id",
                METADATA_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let entries = stmt
                .query_map(params![table], metadata_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn search_metadata(&self, term: &str) -> Result<Vec<MetadataEntry>> {
        let pattern = super::like_pattern(&term.to_lowercase());
        self.with_conn(move |conn| {
            let sql = format!(
                r"SELECT {} FROM metadata_index
                  WHERE lower(coalesce(business_term, '')) LIKE ?1 ESCAPE '\'
                     OR lower(coalesce(description, '')) LIKE ?1 ESCAPE '\'
                     OR lower(coalesce(display_name, '')) LIKE ?1 ESCAPE '\'
                  ORDER BY id",
                METADATA_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let entries = stmt
                .query_map(params![pattern], metadata_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn active_golden_queries(&self) -> Result<Vec<GoldenQuery>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, question, sql_query, description, category \
                 FROM golden_queries WHERE is_active = TRUE ORDER BY id",
            )?;
            let queries = stmt
                .query_map([], |row| {
                    Ok(GoldenQuery {
                        id: row.get(0)?,
                        question: row.get(1)?,
                        sql_query: row.get(2)?,
                        description: row.get(3)?,
                        category: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(queries)
        })
        .await
    }

    async fn record_history(&self, entry: &NewHistoryEntry) -> Result<i64> {
        let entry = entry.clone();
        let created_at = Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO query_history
                (user_question, generated_sql, execution_result, confidence_score, trust_score,
                 agent_used, error_message, execution_time_ms, is_reviewed, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, FALSE, ?9)
                "#,
                params![
                    entry.user_question,
                    entry.generated_sql,
                    entry.execution_result,
                    entry.confidence_score,
                    entry.trust_score,
                    entry.agent_used,
                    entry.error_message,
                    entry.execution_time_ms,
                    created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let limit = limit as i64;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, user_question, generated_sql, agent_used, confidence_score, trust_score,
                       error_message, execution_time_ms, is_reviewed, review_feedback, created_at
                FROM query_history
                ORDER BY created_at DESC, id DESC
                LIMIT ?1
                "#,
            )?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    let created_at: String = row.get(10)?;
                    Ok(HistoryEntry {
                        id: row.get(0)?,
                        question: row.get(1)?,
                        sql: row.get(2)?,
                        agent_used: row.get(3)?,
                        confidence_score: row.get(4)?,
                        trust_score: row.get(5)?,
                        error: row.get(6)?,
                        execution_time_ms: row.get(7)?,
                        is_reviewed: row.get::<_, Option<bool>>(8)?.unwrap_or(false),
                        review_feedback: row.get(9)?,
                        created_at: parse_timestamp(&created_at),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn mark_reviewed(&self, id: i64, feedback: &str) -> Result<bool> {
        let feedback = feedback.to_string();
        self.with_conn(move |conn| {
            let exists = conn
                .query_row("SELECT id FROM query_history WHERE id = ?1", params![id], |row| {
                    row.get::<_, i64>(0)
                })
                .optional()?;
            if exists.is_none() {
                return Ok(false);
            }
            conn.execute(
                "UPDATE query_history SET is_reviewed = TRUE, review_feedback = ?2 WHERE id = ?1",
                params![id, feedback],
            )?;
            Ok(true)
        })
        .await
    }
}

fn collect_rows(conn: &Connection, sql: &str) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut map = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            map.insert(name.clone(), value_to_json(row.get_ref(idx)?));
        }
        out.push(map);
    }
    Ok(out)
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}

fn metadata_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetadataEntry> {
    Ok(MetadataEntry {
        table_name: row.get(0)?,
        column_name: row.get(1)?,
        display_name: row.get(2)?,
        description: row.get(3)?,
        business_term: row.get(4)?,
        data_type: row.get(5)?,
        is_metric: row.get::<_, Option<bool>>(6)?.unwrap_or(false),
        metric_definition: row.get(7)?,
        example_values: row.get(8)?,
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .unwrap_or_else(|_| {
            warn!("Unparseable timestamp in query_history: {}", raw);
            DateTime::<Utc>::UNIX_EPOCH
        })
}

fn preview(statement: &str) -> String {
    let flat: String = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    flat.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn warehouse_with_trips() -> SqliteWarehouse {
        let warehouse = SqliteWarehouse::in_memory().unwrap();
        warehouse
            .run_statements(&[
                "CREATE TABLE trips (id INTEGER PRIMARY KEY, fare REAL, status TEXT)".to_string(),
                "INSERT INTO trips VALUES (1, 12.5, 'completed'), (2, 8.0, 'cancelled'), (3, NULL, 'completed')"
                    .to_string(),
            ])
            .await
            .unwrap();
        warehouse
    }

    #[tokio::test]
    async fn test_run_query_returns_json_rows() {
        let warehouse = warehouse_with_trips().await;
        let rows = warehouse
            .run_query("SELECT id, fare, status FROM trips ORDER BY id", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["id"], Value::from(1));
        assert_eq!(rows[0]["fare"], Value::from(12.5));
        assert_eq!(rows[1]["status"], Value::from("cancelled"));
        assert_eq!(rows[2]["fare"], Value::Null);
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, vec!["id", "fare", "status"]);
    }

    #[tokio::test]
    async fn test_run_query_is_read_only() {
        let warehouse = warehouse_with_trips().await;
        let err = warehouse
            .run_query("DELETE FROM trips", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, FinchError::Database(_)));

        // query_only is switched back off for administrative statements
        warehouse
            .run_statements(&["INSERT INTO trips VALUES (4, 3.0, 'completed')".to_string()])
            .await
            .unwrap();
        let rows = warehouse
            .run_query("SELECT COUNT(*) AS n FROM trips", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(rows[0]["n"], Value::from(4));
    }

    #[tokio::test]
    async fn test_columns_keep_select_list_order() {
        let warehouse = SqliteWarehouse::in_memory().unwrap();
        let rows = warehouse
            .run_query("SELECT 1 AS zeta, 2 AS alpha, 3 AS mid", Duration::from_secs(5))
            .await
            .unwrap();
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_slow_query_is_interrupted() {
        let warehouse = SqliteWarehouse::in_memory().unwrap();
        warehouse
            .run_statements(&[
                "CREATE TABLE n (x INTEGER)".to_string(),
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 3000) \
                 INSERT INTO n SELECT x FROM c"
                    .to_string(),
            ])
            .await
            .unwrap();

        let timeout = Duration::from_millis(200);
        let err = warehouse
            .run_query("SELECT COUNT(*) AS n FROM n a, n b, n c", timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, FinchError::Timeout(t) if t == timeout));
        assert_eq!(err.to_string(), "Query timed out after 200ms");

        // the connection is usable again once the interrupted statement unwinds
        let rows = warehouse
            .run_query("SELECT COUNT(*) AS n FROM n", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(rows[0]["n"], Value::from(3000));
    }

    #[tokio::test]
    async fn test_catalog_queries() {
        let warehouse = warehouse_with_trips().await;
        assert_eq!(warehouse.table_names().await.unwrap(), vec!["trips".to_string()]);

        let columns = warehouse.table_columns("trips").await.unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[1].data_type, "REAL");
        assert!(columns[2].nullable);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let a = parse_timestamp("2026-01-05 10:11:12.123456");
        assert_eq!(a.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-01-05 10:11:12");
        let b = parse_timestamp("2026-01-05 10:11:12");
        assert_eq!(b.format("%H:%M:%S").to_string(), "10:11:12");
    }
}
