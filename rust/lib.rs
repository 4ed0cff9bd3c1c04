//! finch-sql: ask questions about a ride-sharing warehouse in plain language.
//!
//! A supervisor routes each question to the SQL agent (generate, validate and
//! run one SELECT) or the documentation agent, a validator agent scores the
//! SQL against curated golden queries, and every exchange lands in the query
//! history.

pub mod agents;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod metadata;
pub mod security;
pub mod telemetry;

pub use chat::{ChatRequest, ChatResponse, ChatService};
pub use config::AppConfig;
pub use db::{Dialect, Warehouse};
pub use error::{FinchError, Result};
pub use llm::{AiGateway, LlmProvider, ProviderKind};
