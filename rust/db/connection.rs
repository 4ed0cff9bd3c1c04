//! Opens a warehouse from a database URL.

use super::{PostgresWarehouse, SqliteWarehouse, Warehouse};
use crate::error::{FinchError, Result};
use std::sync::Arc;
use tracing::info;

/// Open the warehouse named by `database_url`.
///
/// `postgres://` / `postgresql://` (an `+driver` suffix such as
/// `postgresql+asyncpg://` is accepted) use a pooled sqlx connection;
/// `sqlite://path`, `sqlite:path` and `sqlite::memory:` use rusqlite.
pub async fn connect(database_url: &str) -> Result<Arc<dyn Warehouse>> {
    match parse_url(database_url)? {
        Target::Postgres(url) => {
            info!("Connecting to PostgreSQL warehouse");
            Ok(Arc::new(PostgresWarehouse::connect(&url).await?))
        }
        Target::SqliteMemory => {
            info!("Opening in-memory SQLite warehouse");
            Ok(Arc::new(SqliteWarehouse::in_memory()?))
        }
        Target::SqliteFile(path) => {
            info!("Opening SQLite warehouse at {}", path);
            Ok(Arc::new(SqliteWarehouse::open(&path)?))
        }
    }
}

#[derive(Debug, PartialEq)]
enum Target {
    Postgres(String),
    SqliteFile(String),
    SqliteMemory,
}

fn parse_url(database_url: &str) -> Result<Target> {
    let url = database_url.trim();
    let (scheme, rest) = url
        .split_once(':')
        .ok_or_else(|| FinchError::Config(format!("Invalid database URL: {}", url)))?;
    let base_scheme = scheme.split('+').next().unwrap_or(scheme).to_lowercase();

    match base_scheme.as_str() {
        "postgres" | "postgresql" => Ok(Target::Postgres(format!("postgres:{}", rest))),
        "sqlite" => {
            let path = rest.trim_start_matches("//");
            if path.is_empty() || path == ":memory:" {
                Ok(Target::SqliteMemory)
            } else {
                Ok(Target::SqliteFile(path.to_string()))
            }
        }
        other => Err(FinchError::Config(format!(
            "Unsupported database scheme '{}' (expected postgres or sqlite)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_postgres_urls() {
        assert_eq!(
            parse_url("postgresql+asyncpg://u:p@localhost:5432/finch_db").unwrap(),
            Target::Postgres("postgres://u:p@localhost:5432/finch_db".to_string())
        );
        assert_eq!(
            parse_url("postgres://localhost/db").unwrap(),
            Target::Postgres("postgres://localhost/db".to_string())
        );
    }

    #[test]
    fn test_parse_sqlite_urls() {
        assert_eq!(parse_url("sqlite://finch.db").unwrap(), Target::SqliteFile("finch.db".to_string()));
        assert_eq!(parse_url("sqlite:/tmp/f.db").unwrap(), Target::SqliteFile("/tmp/f.db".to_string()));
        assert_eq!(parse_url("sqlite::memory:").unwrap(), Target::SqliteMemory);
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        assert!(parse_url("mysql://localhost/db").is_err());
        assert!(parse_url("finch.db").is_err());
    }

    #[tokio::test]
    async fn test_connect_in_memory() {
        let warehouse = connect("sqlite::memory:").await.unwrap();
        assert_eq!(warehouse.dialect(), super::super::Dialect::Sqlite);
    }
}
