//! Query Validator
//!
//! Read-only guard for generated SQL: keyword blocklist, single statement,
//! SELECT only, and bounded execution time.

use crate::db::{Row, Warehouse};
use crate::error::Result;
use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast::visit_relations;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

const BLOCKED_PATTERNS: &[&str] = &[
    r"\bDROP\b",
    r"\bDELETE\b",
    r"\bTRUNCATE\b",
    r"\bUPDATE\b",
    r"\bINSERT\b",
    r"\bALTER\b",
    r"\bCREATE\b",
    r"\bGRANT\b",
    r"\bREVOKE\b",
    r"\bEXEC\b",
    r"\bEXECUTE\b",
    r";.*DROP",
    r";.*DELETE",
    r";.*UPDATE",
];

lazy_static! {
    static ref BLOCKED: Vec<(&'static str, Regex)> = BLOCKED_PATTERNS
        .iter()
        .map(|p| (*p, Regex::new(&format!("(?is){}", p)).expect("blocked pattern")))
        .collect();
    static ref STARTS_WITH_SELECT: Regex = Regex::new(r"(?i)^\s*SELECT\b").expect("select pattern");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace pattern");
    static ref FROM_OR_JOIN: Regex =
        Regex::new(r"(?i)(?:FROM|JOIN)\s+([a-zA-Z_][a-zA-Z0-9_]*)").expect("table pattern");
}

/// Why a statement was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Empty query")]
    Empty,
    #[error("Blocked keyword detected: {0}")]
    BlockedKeyword(String),
    #[error("Multiple statements not allowed")]
    MultipleStatements,
    #[error("Only SELECT queries are allowed")]
    NotSelect,
    #[error("Suspicious comment patterns detected")]
    SuspiciousComments,
}

#[derive(Debug, Clone)]
pub struct QueryValidator {
    timeout: Duration,
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT)
    }
}

impl QueryValidator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Checks run in a fixed order; the first failure wins.
    pub fn validate(&self, sql: &str) -> std::result::Result<(), Rejection> {
        if sql.trim().is_empty() {
            return Err(Rejection::Empty);
        }

        if let Some((pattern, _)) = BLOCKED.iter().find(|(_, re)| re.is_match(sql)) {
            return Err(Rejection::BlockedKeyword(pattern.to_string()));
        }

        if sql.matches(';').count() > 1 {
            return Err(Rejection::MultipleStatements);
        }

        if !STARTS_WITH_SELECT.is_match(sql) {
            return Err(Rejection::NotSelect);
        }

        if sql.matches("--").count() > 2 {
            return Err(Rejection::SuspiciousComments);
        }

        Ok(())
    }

    /// Drop trailing semicolons and `--` comments, then collapse whitespace.
    pub fn sanitize(&self, sql: &str) -> String {
        let trimmed = sql.trim().trim_end_matches(';').trim();
        let without_comments = strip_line_comments(trimmed);
        let collapsed = WHITESPACE.replace_all(without_comments.trim(), " ");
        collapsed.trim_end_matches(';').trim().to_string()
    }

    /// Validate, sanitize and run `sql` against the warehouse.
    pub async fn execute_safe(&self, warehouse: &dyn Warehouse, sql: &str) -> Result<Vec<Row>> {
        if let Err(rejection) = self.validate(sql) {
            warn!("Query validation failed: {}", rejection);
            return Err(rejection.into());
        }

        let sql = self.sanitize(sql);
        debug!("Executing validated query: {}", sql);
        warehouse.run_query(&sql, self.timeout).await.map_err(|e| {
            warn!("Query execution error: {}", e);
            e
        })
    }

    /// Distinct relation names referenced by the query, sorted.
    pub fn extract_table_names(&self, sql: &str) -> Vec<String> {
        let mut names = BTreeSet::new();

        match Parser::parse_sql(&GenericDialect {}, sql) {
            Ok(statements) => {
                let _ = visit_relations(&statements, |relation| {
                    if let Some(ident) = relation.0.last() {
                        names.insert(ident.value.clone());
                    }
                    ControlFlow::<()>::Continue(())
                });
            }
            Err(e) => {
                debug!("sqlparser could not parse query ({}), using regex fallback", e);
                for cap in FROM_OR_JOIN.captures_iter(sql) {
                    names.insert(cap[1].to_string());
                }
            }
        }

        names.into_iter().collect()
    }
}

/// Remove `--` comments that are not inside a single-quoted literal.
fn strip_line_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_literal = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                out.push(c);
            }
            '-' if !in_literal && chars.peek() == Some(&'-') => {
                // skip to end of line, keep the newline as a separator
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}
