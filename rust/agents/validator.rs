//! Validator Agent
//!
//! Scores generated SQL against the closest golden query: same question
//! wording, similar results, similar SQL text.

use crate::db::{GoldenQuery, Row, Warehouse};
use crate::error::Result;
use crate::security::QueryValidator;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared words a golden question needs before it counts as a match.
pub const MIN_WORD_OVERLAP: usize = 3;

const NUMERIC_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub trust_score: f64,
    pub matched_golden: Option<String>,
    pub validation_notes: Vec<String>,
}

impl ValidationOutcome {
    fn new(trust_score: f64, matched_golden: Option<String>, notes: Vec<String>) -> Self {
        Self {
            trust_score,
            matched_golden,
            validation_notes: notes,
        }
    }
}

pub struct ValidatorAgent {
    warehouse: Arc<dyn Warehouse>,
    validator: QueryValidator,
}

impl ValidatorAgent {
    pub fn new(warehouse: Arc<dyn Warehouse>, validator: QueryValidator) -> Self {
        Self { warehouse, validator }
    }

    pub async fn validate(&self, question: &str, generated_sql: &str, results: &[Row]) -> ValidationOutcome {
        match self.try_validate(question, generated_sql, results).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Validation error: {}", e);
                ValidationOutcome::new(0.5, None, vec![format!("Validation error: {}", e)])
            }
        }
    }

    async fn try_validate(&self, question: &str, generated_sql: &str, results: &[Row]) -> Result<ValidationOutcome> {
        let golden_queries = self.warehouse.active_golden_queries().await?;
        let Some(golden) = find_matching_golden(question, &golden_queries) else {
            return Ok(ValidationOutcome::new(
                0.6,
                None,
                vec!["No matching golden query found for comparison".to_string()],
            ));
        };
        info!("Comparing against golden query #{}: {}", golden.id, golden.question);

        let golden_rows = match self.validator.execute_safe(self.warehouse.as_ref(), &golden.sql_query).await {
            Ok(rows) => rows,
            Err(e) => {
                return Ok(ValidationOutcome::new(
                    0.5,
                    Some(golden.question.clone()),
                    vec![format!("Could not execute golden query: {}", e)],
                ));
            }
        };

        let (result_score, mut notes) = compare_results(results, &golden_rows);
        let sql_score = sql_similarity(generated_sql, &golden.sql_query);
        let trust = round2(0.7 * result_score + 0.3 * sql_score);

        notes.push(format!("Golden query match: {}", golden.question));
        notes.push(format!("SQL similarity: {:.2}", sql_score));

        Ok(ValidationOutcome::new(trust, Some(golden.question.clone()), notes))
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}

/// Most shared words wins; ties go to the closer question text, then the
/// lower id.
pub fn find_matching_golden<'a>(question: &str, golden_queries: &'a [GoldenQuery]) -> Option<&'a GoldenQuery> {
    let words = word_set(question);
    let lowered = question.to_lowercase();

    golden_queries
        .iter()
        .map(|golden| (golden, word_set(&golden.question).intersection(&words).count()))
        .filter(|(_, overlap)| *overlap >= MIN_WORD_OVERLAP)
        .map(|(golden, overlap)| {
            let similarity = strsim::normalized_levenshtein(&lowered, &golden.question.to_lowercase());
            (golden, overlap, similarity)
        })
        .sorted_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.2.total_cmp(&a.2))
                .then_with(|| a.0.id.cmp(&b.0.id))
        })
        .map(|(golden, _, _)| golden)
        .next()
}

/// Score in [0, 1] plus the notes describing the comparison.
pub fn compare_results(generated: &[Row], golden: &[Row]) -> (f64, Vec<String>) {
    match (generated.is_empty(), golden.is_empty()) {
        (true, true) => return (1.0, vec!["Both queries returned empty results".to_string()]),
        (true, false) | (false, true) => {
            return (0.3, vec!["One query returned empty results".to_string()])
        }
        _ => {}
    }

    let mut notes = Vec::new();
    let row_score = if generated.len() == golden.len() {
        notes.push(format!("Row counts match: {}", generated.len()));
        1.0
    } else {
        notes.push(format!(
            "Row count mismatch: {} vs {}",
            generated.len(),
            golden.len()
        ));
        0.5
    };

    let first = compare_rows(&generated[0], &golden[0]);
    notes.push(format!("First row similarity: {:.2}", first));

    (0.4 * row_score + 0.6 * first, notes)
}

/// Fraction of the union of keys whose values agree.
pub fn compare_rows(a: &Row, b: &Row) -> f64 {
    let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    if keys.is_empty() {
        return 1.0;
    }

    let matching = keys
        .iter()
        .filter(|key| match (a.get(key.as_str()), b.get(key.as_str())) {
            (Some(x), Some(y)) => values_match(x, y),
            _ => false,
        })
        .count();

    matching as f64 / keys.len() as f64
}

fn values_match(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => (x - y).abs() < NUMERIC_TOLERANCE,
        _ => as_text(a) == as_text(b),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn sql_words(sql: &str) -> HashSet<String> {
    let upper = sql.to_uppercase();
    let normalized = upper.split_whitespace().join(" ");
    normalized
        .trim_end_matches(';')
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Jaccard index of the two statements' word sets.
pub fn sql_similarity(a: &str, b: &str) -> f64 {
    let a = sql_words(a);
    let b = sql_words(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn golden(id: i64, question: &str) -> GoldenQuery {
        GoldenQuery {
            id,
            question: question.to_string(),
            sql_query: "SELECT 1".to_string(),
            description: None,
            category: None,
        }
    }

    #[test]
    fn test_golden_match_needs_three_words() {
        let goldens = vec![
            golden(1, "What is the total revenue for USNC last month?"),
            golden(2, "How many trips were completed yesterday?"),
        ];
        let hit = find_matching_golden("what is the total revenue in March", &goldens).unwrap();
        assert_eq!(hit.id, 1);
        assert!(find_matching_golden("top drivers", &goldens).is_none());
    }

    #[test]
    fn test_golden_ties_prefer_closer_question_then_id() {
        let goldens = vec![
            golden(1, "how many trips were cancelled"),
            golden(2, "how many trips were completed"),
            golden(3, "how many trips were completed"),
        ];
        let hit = find_matching_golden("how many trips were completed", &goldens).unwrap();
        assert_eq!(hit.id, 2);
    }

    #[test]
    fn test_compare_results_empty_cases() {
        let some = vec![row(json!({"n": 1}))];
        assert_eq!(compare_results(&[], &[]).0, 1.0);
        let (score, notes) = compare_results(&some, &[]);
        assert_eq!(score, 0.3);
        assert_eq!(notes, vec!["One query returned empty results".to_string()]);
    }

    #[test]
    fn test_compare_results_weights_rows_and_first_row() {
        let generated = vec![row(json!({"revenue": 100.004, "region": "USNC"}))];
        let golden = vec![
            row(json!({"revenue": "100.0", "region": "USNC"})),
            row(json!({"revenue": 5, "region": "USSC"})),
        ];
        let (score, notes) = compare_results(&generated, &golden);
        assert!((score - (0.4 * 0.5 + 0.6 * 1.0)).abs() < 1e-9);
        assert_eq!(notes[0], "Row count mismatch: 1 vs 2");
        assert_eq!(notes[1], "First row similarity: 1.00");
    }

    #[test]
    fn test_compare_rows_union_and_nulls() {
        let a = row(json!({"x": 1, "y": null, "z": true}));
        let b = row(json!({"x": 1.0, "y": null, "w": 2, "z": 1}));
        // x and z match out of {w, x, y, z}
        assert_eq!(compare_rows(&a, &b), 0.5);
        assert_eq!(compare_rows(&Row::new(), &Row::new()), 1.0);
        assert_eq!(compare_rows(&row(json!({"s": "abc"})), &row(json!({"s": "abc"}))), 1.0);
    }

    #[test]
    fn test_sql_similarity() {
        assert_eq!(sql_similarity("select a from t;", "SELECT  a\nFROM t"), 1.0);
        assert_eq!(sql_similarity("", "  "), 1.0);
        // {SELECT, A, FROM, T} vs {SELECT, B, FROM, T}
        assert_eq!(sql_similarity("SELECT a FROM t", "SELECT b FROM t"), 0.6);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.7 * 0.94 + 0.3 * 0.5), 0.81);
    }
}
