//! End-to-end chat pipeline over a seeded SQLite warehouse with a scripted LLM.

use async_trait::async_trait;
use finch_sql::chat::TableKind;
use finch_sql::db::seed::{seed, SeedOptions};
use finch_sql::db::SqliteWarehouse;
use finch_sql::llm::{AiGateway, Completion, GenerateRequest, LlmProvider, ProviderKind, RetryPolicy};
use finch_sql::{AppConfig, ChatRequest, ChatService, FinchError, Warehouse};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const TOP_DRIVERS_SQL: &str =
    "SELECT name, total_earnings FROM drivers WHERE is_active = true ORDER BY total_earnings DESC LIMIT 5";

/// Answers by looking at which agent is asking.
struct Scripted {
    kind: ProviderKind,
    intent: &'static str,
    sql_reply: String,
    doc_reply: &'static str,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(intent: &'static str, sql_reply: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::Local,
            intent,
            sql_reply: sql_reply.into(),
            doc_reply: "USNC is the US and Canada region.",
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmProvider for Scripted {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(&self, request: &GenerateRequest) -> finch_sql::Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let system = request.system_prompt.as_deref().unwrap_or_default();
        let text = if system.contains("query classifier") {
            self.intent.to_string()
        } else if system.contains("SQL query generator") {
            self.sql_reply.clone()
        } else {
            self.doc_reply.to_string()
        };
        Ok(Completion::new(text, self.kind, "scripted", 42))
    }
}

struct Harness {
    _dir: TempDir,
    warehouse: Arc<dyn Warehouse>,
    service: ChatService,
    provider: Arc<Scripted>,
}

async fn harness(provider: Scripted, config: AppConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let warehouse: Arc<dyn Warehouse> = Arc::new(SqliteWarehouse::open(dir.path().join("finch.db")).unwrap());
    seed(warehouse.as_ref(), &SeedOptions::small()).await.unwrap();

    let provider = Arc::new(provider);
    let gateway = Arc::new(
        AiGateway::new(ProviderKind::Local)
            .with_provider(provider.clone())
            .with_retry(RetryPolicy::none()),
    );
    let service = ChatService::new(&config, warehouse.clone(), gateway);

    Harness {
        _dir: dir,
        warehouse,
        service,
        provider,
    }
}

fn sql_reply(sql: &str, confidence: &str) -> String {
    format!(
        "```sql\n{}\n```\n\nExplanation: Lists the best paid drivers.\n\nConfidence: {}",
        sql, confidence
    )
}

#[tokio::test]
async fn test_sql_question_runs_and_matches_golden() {
    let h = harness(
        Scripted::new("SQL_QUERY", sql_reply(TOP_DRIVERS_SQL, "High")),
        AppConfig::default(),
    )
    .await;

    let response = h
        .service
        .chat(&ChatRequest::new("Top 5 drivers by total earnings"), "tester")
        .await
        .unwrap();

    assert_eq!(response.agent_used, "sql_agent");
    assert_eq!(response.error, None);
    assert_eq!(response.sql.as_deref(), Some(TOP_DRIVERS_SQL));
    assert_eq!(response.explanation.as_deref(), Some("Lists the best paid drivers."));
    assert_eq!(response.confidence_score, Some(0.9));
    let rows = response.row_count.unwrap();
    assert!((1..=5).contains(&rows));
    assert_eq!(response.tables_used, vec!["drivers".to_string()]);
    assert_eq!(response.ai_provider, Some(ProviderKind::Local));

    // identical SQL against the golden query
    assert_eq!(response.trust_score, Some(1.0));
    assert_eq!(
        response.validation_notes[response.validation_notes.len() - 2..],
        [
            "Golden query match: Top 5 drivers by total earnings?".to_string(),
            "SQL similarity: 1.00".to_string(),
        ]
    );
    assert!(response.validation_notes[0].starts_with("Row counts match: "));
    assert!(response.history_id.is_some());

    // classifier + generator
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_result_is_still_scored_against_golden() {
    let empty_sql = "SELECT name, total_earnings FROM drivers WHERE 1 = 0";
    let h = harness(
        Scripted::new("SQL_QUERY", sql_reply(empty_sql, "Medium")),
        AppConfig::default(),
    )
    .await;

    let response = h
        .service
        .chat(&ChatRequest::new("Top 5 drivers by total earnings"), "tester")
        .await
        .unwrap();

    assert_eq!(response.error, None);
    assert_eq!(response.row_count, Some(0));

    // golden returns rows, generated returns none: 0.7 * 0.3 + 0.3 * similarity
    let similarity = finch_sql::agents::validator::sql_similarity(empty_sql, TOP_DRIVERS_SQL);
    let expected = ((0.7 * 0.3 + 0.3 * similarity) * 100.0).round() / 100.0;
    assert_eq!(response.trust_score, Some(expected));
    assert_eq!(
        response.validation_notes,
        vec![
            "One query returned empty results".to_string(),
            "Golden query match: Top 5 drivers by total earnings?".to_string(),
            format!("SQL similarity: {:.2}", similarity),
        ]
    );
}

#[tokio::test]
async fn test_unmatched_question_gets_default_trust() {
    let h = harness(
        Scripted::new("SQL_QUERY", sql_reply("SELECT code FROM regions", "Low")),
        AppConfig::default(),
    )
    .await;

    let response = h
        .service
        .chat(&ChatRequest::new("list region codes"), "tester")
        .await
        .unwrap();

    assert_eq!(response.row_count, Some(5));
    assert_eq!(response.confidence_score, Some(0.4));
    assert_eq!(response.trust_score, Some(0.6));
    assert_eq!(
        response.validation_notes,
        vec!["No matching golden query found for comparison".to_string()]
    );
}

#[tokio::test]
async fn test_destructive_sql_is_refused_and_recorded() {
    let h = harness(
        Scripted::new("SQL_QUERY", sql_reply("DELETE FROM trips", "High")),
        AppConfig::default(),
    )
    .await;

    let response = h
        .service
        .chat(&ChatRequest::new("remove all trips"), "tester")
        .await
        .unwrap();

    let error = response.error.clone().unwrap();
    assert!(error.starts_with("Security validation failed: Blocked keyword detected"), "{}", error);
    assert_eq!(response.confidence_score, Some(0.0));
    assert_eq!(response.trust_score, None);
    assert!(response.results.is_none());

    let trips = h
        .warehouse
        .run_query("SELECT COUNT(*) AS n FROM trips", std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(trips[0]["n"], 30);

    let history = h.service.history(None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].error.as_deref(), Some(error.as_str()));
    assert_eq!(history[0].sql.as_deref(), Some("DELETE FROM trips"));
}

#[tokio::test]
async fn test_reply_without_sql_reports_generation_failure() {
    let h = harness(Scripted::new("SQL", "I am not sure how to answer that."), AppConfig::default()).await;

    let response = h
        .service
        .chat(&ChatRequest::new("how many trips"), "tester")
        .await
        .unwrap();

    assert_eq!(response.sql, None);
    assert_eq!(response.error.as_deref(), Some("SQL generation failed"));
    assert_eq!(response.explanation.as_deref(), Some("Could not generate valid SQL"));
    assert_eq!(response.confidence_score, Some(0.0));
}

#[tokio::test]
async fn test_documentation_question_goes_to_doc_agent() {
    let h = harness(Scripted::new("DOCUMENTATION", ""), AppConfig::default()).await;

    let response = h
        .service
        .chat(&ChatRequest::new("What does USNC mean?"), "tester")
        .await
        .unwrap();

    assert_eq!(response.agent_used, "doc_agent");
    assert_eq!(response.answer.as_deref(), Some("USNC is the US and Canada region."));
    assert_eq!(response.sql, None);
    assert_eq!(response.sources.len(), 3);
    assert_eq!(response.trust_score, None);

    let history = h.service.history(Some(10)).await.unwrap();
    assert_eq!(history[0].agent_used.as_deref(), Some("doc_agent"));
}

#[tokio::test]
async fn test_rate_limit_rejects_before_any_llm_call() {
    let config = AppConfig {
        max_requests_per_minute: 1,
        ..AppConfig::default()
    };
    let h = harness(Scripted::new("DOCUMENTATION", ""), config).await;
    let request = ChatRequest::new("Explain surge pricing");

    h.service.chat(&request, "busy").await.unwrap();
    let calls = h.provider.calls.load(Ordering::SeqCst);

    let err = h.service.chat(&request, "busy").await.unwrap_err();
    assert!(matches!(err, FinchError::RateLimited(_)));
    assert_eq!(err.to_string(), "Rate limit exceeded. Max 1 requests per 60s.");
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), calls);

    // other clients are unaffected
    h.service.chat(&request, "someone-else").await.unwrap();
}

#[tokio::test]
async fn test_review_marks_history_entry() {
    let h = harness(Scripted::new("DOCUMENTATION", ""), AppConfig::default()).await;
    let response = h
        .service
        .chat(&ChatRequest::new("What tables are available?"), "tester")
        .await
        .unwrap();
    let id = response.history_id.unwrap();

    h.service.request_review(id, "answer was vague").await.unwrap();
    let history = h.service.history(None).await.unwrap();
    assert!(history[0].is_reviewed);
    assert_eq!(history[0].review_feedback.as_deref(), Some("answer was vague"));

    let err = h.service.request_review(id + 100, "").await.unwrap_err();
    assert!(matches!(err, FinchError::NotFound(_)));
}

#[tokio::test]
async fn test_catalog_stats_and_health() {
    let h = harness(Scripted::new("SQL", ""), AppConfig::default()).await;

    let tables = h.service.tables().await.unwrap();
    let trips = tables.iter().find(|t| t.name == "trips").unwrap();
    assert_eq!(trips.row_count, 30);
    assert_eq!(trips.kind, TableKind::Transactional);
    let summary = tables.iter().find(|t| t.name == "region_revenue_summary").unwrap();
    assert_eq!(summary.kind, TableKind::Flattened);

    let preview = h.service.table_preview("drivers").await.unwrap();
    assert_eq!(preview.sample_data.len(), 10);
    assert!(preview.columns.iter().any(|c| c.name == "total_earnings"));
    assert!(matches!(
        h.service.table_preview("nope").await.unwrap_err(),
        FinchError::NotFound(_)
    ));

    let stats = h.service.stats().await.unwrap();
    assert_eq!(stats.total_users, 20);
    assert_eq!(stats.total_drivers, 10);
    assert_eq!(stats.total_queries, 0);

    let health = h.service.health().await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.database, "connected");
    assert_eq!(health.configured_providers, vec![ProviderKind::Local]);
}

#[tokio::test]
async fn test_model_override_reaches_every_call() {
    let h = harness(Scripted::new("DOCUMENTATION", ""), AppConfig::default()).await;
    let request = ChatRequest::new("Explain surge pricing").with_model(ProviderKind::Groq);

    // groq is not registered, so each call falls back to the scripted local provider
    let response = h.service.chat(&request, "tester").await.unwrap();
    assert_eq!(response.agent_used, "doc_agent");
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 2);
}
