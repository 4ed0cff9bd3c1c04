use crate::security::Rejection;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Security validation failed: {0}")]
    Security(#[from] Rejection),

    #[error("{0}")]
    RateLimited(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for FinchError {
    fn from(err: rusqlite::Error) -> Self {
        FinchError::Database(err.to_string())
    }
}

impl From<sqlx::Error> for FinchError {
    fn from(err: sqlx::Error) -> Self {
        FinchError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for FinchError {
    fn from(err: reqwest::Error) -> Self {
        FinchError::Llm(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FinchError>;
