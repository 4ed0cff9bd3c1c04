//! Agents: supervisor routing plus the SQL, validator and documentation agents.

pub mod doc_agent;
pub mod sql_agent;
pub mod supervisor;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use doc_agent::{DocAgent, DocAgentResponse};
pub use sql_agent::{SqlAgent, SqlAgentResponse};
pub use supervisor::Supervisor;
pub use validator::{ValidationOutcome, ValidatorAgent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    SqlQuery,
    Documentation,
}

/// Which agent answered, as stored in `query_history.agent_used`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    SqlAgent,
    DocAgent,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::SqlAgent => "sql_agent",
            AgentKind::DocAgent => "doc_agent",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum AgentReply {
    Sql(SqlAgentResponse),
    Doc(DocAgentResponse),
}

impl AgentReply {
    pub fn agent(&self) -> AgentKind {
        match self {
            AgentReply::Sql(_) => AgentKind::SqlAgent,
            AgentReply::Doc(_) => AgentKind::DocAgent,
        }
    }
}
