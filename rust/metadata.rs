//! Metadata Service
//!
//! Table and column descriptions, business terms and metric definitions from
//! the `metadata_index` table, plus the context blocks handed to the agents.

use crate::db::{schema, ColumnInfo, MetadataEntry, Warehouse};
use crate::error::{FinchError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

const RELEVANT_METADATA_LIMIT: usize = 5;
const DOC_MATCHES_PER_KEYWORD: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub display_name: String,
    pub description: Option<String>,
    pub data_type: Option<String>,
    pub is_metric: bool,
    pub metric_definition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table_name: String,
    pub columns: BTreeMap<String, ColumnMetadata>,
    pub metrics: Vec<String>,
    pub business_terms: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
}

pub struct MetadataService {
    warehouse: Arc<dyn Warehouse>,
    cache: DashMap<String, TableMetadata>,
}

impl MetadataService {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            warehouse,
            cache: DashMap::new(),
        }
    }

    /// Column descriptions, metric list and business terms for one table.
    /// Cached for the life of the service.
    pub async fn get_table_metadata(&self, table: &str) -> Result<TableMetadata> {
        if let Some(cached) = self.cache.get(table) {
            return Ok(cached.clone());
        }

        let entries = self.warehouse.metadata_for_table(table).await?;
        let mut metadata = TableMetadata {
            table_name: table.to_string(),
            ..TableMetadata::default()
        };

        for entry in entries {
            let Some(column) = entry.column_name.clone() else {
                continue;
            };
            if entry.is_metric {
                metadata.metrics.push(column.clone());
            }
            if let Some(terms) = &entry.business_term {
                metadata.business_terms.extend(parse_business_terms(terms));
            }
            metadata.columns.insert(
                column.clone(),
                ColumnMetadata {
                    display_name: entry.display_name.unwrap_or(column),
                    description: entry.description,
                    data_type: entry.data_type,
                    is_metric: entry.is_metric,
                    metric_definition: entry.metric_definition,
                },
            );
        }

        self.cache.insert(table.to_string(), metadata.clone());
        Ok(metadata)
    }

    /// Entries whose business term, description or display name contains
    /// `term`, ignoring case.
    pub async fn search_metadata(&self, term: &str) -> Result<Vec<MetadataEntry>> {
        self.warehouse.search_metadata(term).await
    }

    /// Map a code such as `usnc` to its canonical spelling (`USNC`).
    pub async fn resolve_business_term(&self, term: &str) -> Result<Option<String>> {
        let wanted = term.trim().to_uppercase();
        if wanted.is_empty() {
            return Ok(None);
        }

        let entries = self.warehouse.search_metadata(&wanted).await?;
        for entry in entries {
            let Some(terms) = entry.business_term else {
                continue;
            };
            if let Some((code, _)) = parse_business_terms(&terms)
                .into_iter()
                .find(|(code, _)| code.to_uppercase() == wanted)
            {
                return Ok(Some(code));
            }
        }
        Ok(None)
    }

    pub fn flattened_tables(&self) -> Vec<String> {
        schema::FLATTENED_TABLES.iter().map(|t| t.to_string()).collect()
    }

    /// Live column list from the database catalog.
    pub async fn table_schema(&self, table: &str) -> Result<TableSchema> {
        let columns = self.warehouse.table_columns(table).await?;
        if columns.is_empty() {
            return Err(FinchError::NotFound(format!("Table {} not found", table)));
        }
        Ok(TableSchema {
            table_name: table.to_string(),
            columns,
        })
    }

    /// Context handed to the SQL agent.
    pub async fn build_context_for_query(&self, question: &str) -> Result<String> {
        let mut ctx = String::new();
        ctx.push_str("# DATABASE CONTEXT\n\n");

        ctx.push_str("## Flattened Analytics Tables (USE THESE FOR AGGREGATE METRICS ONLY):\n");
        ctx.push_str("- trip_metrics_daily: Daily aggregated trip statistics by region\n");
        ctx.push_str("  Columns: date, region_id, total_trips, completed_trips, cancelled_trips, total_revenue, avg_trip_distance, avg_trip_duration, avg_fare, unique_users, unique_drivers, surge_trips, promo_trips\n");
        ctx.push_str("  WARNING: NO driver_id, user_id, or individual trip details!\n");
        ctx.push_str("- region_revenue_summary: Monthly revenue by region\n");
        ctx.push_str("  Columns: region_id, year, month, total_revenue, total_trips, total_distance_km, active_users, active_drivers, avg_rating, support_tickets\n");
        ctx.push_str("  WARNING: NO individual driver/user data!\n\n");

        ctx.push_str("## Transactional Tables (USE FOR INDIVIDUAL RECORDS):\n");
        ctx.push_str("- regions: id, name, code, country, city, timezone, is_active\n");
        ctx.push_str("- users: id, email, name, phone, created_at, is_active, total_trips\n");
        ctx.push_str("- drivers: id, name, email, phone, license_number, region_id, vehicle_id, rating, is_active, total_trips, total_earnings, created_at\n");
        ctx.push_str("  WARNING: drivers table has name/email directly, NO user_id!\n");
        ctx.push_str("- trips: id, user_id, driver_id, vehicle_id, region_id, pickup_location, dropoff_location, pickup_time, dropoff_time, distance_km, duration_minutes, base_fare, surge_multiplier, total_fare, status, payment_id, promotion_id, created_at\n");
        ctx.push_str("- payments: id, amount, payment_method, status, transaction_id, created_at\n");
        ctx.push_str("- ratings: id, trip_id, user_id, driver_id, user_rating, driver_rating, user_comment, driver_comment, created_at\n\n");

        let relevant = self.relevant_metadata(question).await?;
        if !relevant.is_empty() {
            ctx.push_str("## Relevant Metadata:\n");
            for entry in &relevant {
                let _ = writeln!(ctx, "{}", describe_entry(entry));
            }
            ctx.push('\n');
        }

        ctx.push_str("## Business Terms:\n");
        ctx.push_str("- USNC = US and Canada region (code in regions table)\n");
        ctx.push_str("- EU = Europe region\n");
        ctx.push_str("- APAC = Asia Pacific region\n");
        ctx.push_str("- LATAM = Latin America region\n\n");

        ctx.push_str("## IMPORTANT RULES:\n");
        ctx.push_str("1. For INDIVIDUAL driver/user queries (top drivers, specific user trips, etc), USE transactional tables (drivers, trips, users)\n");
        ctx.push_str("2. For AGGREGATE metrics by region/date (total revenue, daily stats), USE flattened tables\n");
        ctx.push_str("3. Join with regions table to resolve region codes (USNC, EU, APAC, LATAM)\n");
        ctx.push_str("4. For driver earnings/ratings: Query drivers table or JOIN trips with drivers\n");
        ctx.push_str("5. Always use appropriate date filters\n");
        ctx.push_str("6. Use LIMIT for queries returning many rows\n\n");

        Ok(ctx)
    }

    /// Context handed to the documentation agent.
    pub async fn build_doc_context(&self, question: &str) -> Result<String> {
        let mut ctx = String::new();
        ctx.push_str("# RIDE-SHARING ANALYTICS SYSTEM\n\n");

        ctx.push_str("## Business Terms:\n");
        ctx.push_str("- USNC: US and Canada region\n");
        ctx.push_str("- EU: Europe region\n");
        ctx.push_str("- APAC: Asia Pacific region\n");
        ctx.push_str("- LATAM: Latin America region\n\n");

        ctx.push_str("## Key Metrics:\n");
        ctx.push_str("- Total Revenue: Sum of all trip fares\n");
        ctx.push_str("- Completed Trips: Number of successfully finished trips\n");
        ctx.push_str("- Active Users: Users who took at least one trip in period\n");
        ctx.push_str("- Average Rating: Driver ratings from 1-5 stars\n");
        ctx.push_str("- Surge Multiplier: Price increase during high demand (1.0 = normal)\n\n");

        ctx.push_str("## Database Structure:\n");
        ctx.push_str("- Transactional Tables: users, drivers, trips, payments, etc.\n");
        ctx.push_str("- Flattened Analytics Tables:\n");
        ctx.push_str("  * trip_metrics_daily: Daily aggregated trip statistics\n");
        ctx.push_str("  * region_revenue_summary: Monthly revenue by region\n\n");

        for keyword in keywords(question) {
            let matches = self.warehouse.search_metadata(&keyword).await?;
            if matches.is_empty() {
                continue;
            }
            let _ = writeln!(ctx, "## Relevant to '{}':", keyword);
            for entry in matches.iter().take(DOC_MATCHES_PER_KEYWORD) {
                let _ = writeln!(ctx, "{}", describe_entry(entry));
            }
        }

        Ok(ctx)
    }

    /// First distinct hits across every keyword of the question.
    async fn relevant_metadata(&self, question: &str) -> Result<Vec<MetadataEntry>> {
        let mut seen = HashSet::new();
        let mut hits = Vec::new();

        for keyword in keywords(question) {
            for entry in self.warehouse.search_metadata(&keyword).await? {
                let key = (entry.table_name.clone(), entry.column_name.clone());
                if seen.insert(key) {
                    hits.push(entry);
                }
            }
            if hits.len() >= RELEVANT_METADATA_LIMIT {
                break;
            }
        }

        hits.truncate(RELEVANT_METADATA_LIMIT);
        debug!("{} relevant metadata entries for question", hits.len());
        Ok(hits)
    }
}

/// Parse `"USNC=US and Canada, EU=Europe"` into `(code, meaning)` pairs.
pub fn parse_business_terms(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (code, meaning) = pair.trim().split_once('=')?;
            let code = code.trim();
            (!code.is_empty()).then(|| (code.to_string(), meaning.trim().to_string()))
        })
        .collect()
}

/// Lower-cased question words longer than three characters, stripped of
/// surrounding punctuation.
pub fn keywords(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric() && c != '_'))
        .filter(|word| word.chars().count() > 3)
        .map(String::from)
        .collect()
}

fn describe_entry(entry: &MetadataEntry) -> String {
    let target = match &entry.column_name {
        Some(column) => format!("{}.{}", entry.table_name, column),
        None => entry.table_name.clone(),
    };
    format!(
        "- {}: {}",
        target,
        entry.description.as_deref().unwrap_or("No description")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::seed::{self, SeedOptions};
    use crate::db::SqliteWarehouse;

    async fn seeded_service() -> MetadataService {
        let warehouse = SqliteWarehouse::in_memory().unwrap();
        seed::seed(&warehouse, &SeedOptions::small()).await.unwrap();
        MetadataService::new(Arc::new(warehouse))
    }

    #[test]
    fn test_parse_business_terms() {
        let terms = parse_business_terms("USNC=US and Canada, EU=Europe,bogus, =x");
        assert_eq!(
            terms,
            vec![
                ("USNC".to_string(), "US and Canada".to_string()),
                ("EU".to_string(), "Europe".to_string()),
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            keywords("What is the total revenue for USNC?"),
            vec!["what", "total", "revenue", "usnc"]
        );
    }

    #[tokio::test]
    async fn test_table_metadata_is_parsed_and_cached() {
        let service = seeded_service().await;
        let metadata = service.get_table_metadata("trip_metrics_daily").await.unwrap();
        assert_eq!(metadata.metrics, vec!["total_revenue", "completed_trips"]);
        assert_eq!(metadata.columns["total_revenue"].display_name, "Daily Revenue");
        assert!(service.cache.contains_key("trip_metrics_daily"));

        let regions = service.get_table_metadata("regions").await.unwrap();
        assert_eq!(regions.business_terms["APAC"], "Asia Pacific");
        assert!(regions.metrics.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_business_term() {
        let service = seeded_service().await;
        assert_eq!(
            service.resolve_business_term("latam").await.unwrap(),
            Some("LATAM".to_string())
        );
        assert_eq!(service.resolve_business_term("MARS").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let service = seeded_service().await;
        let hits = service.search_metadata("REVENUE").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.column_name.as_deref() == Some("total_revenue")));
    }

    #[tokio::test]
    async fn test_context_includes_relevant_metadata() {
        let service = seeded_service().await;
        let ctx = service
            .build_context_for_query("What is the total revenue for USNC last month?")
            .await
            .unwrap();
        assert!(ctx.starts_with("# DATABASE CONTEXT"));
        assert!(ctx.contains("## Relevant Metadata:"));
        assert!(ctx.contains("- trip_metrics_daily.total_revenue: Total revenue for the day"));
        assert!(ctx.contains("- regions.code: Unique code for geographic region"));
        assert!(ctx.contains("6. Use LIMIT for queries returning many rows"));

        let doc = service.build_doc_context("Explain surge pricing").await.unwrap();
        assert!(doc.contains("## Relevant to 'surge':"));
        assert!(doc.contains("- trips.surge_multiplier:"));
    }

    #[tokio::test]
    async fn test_table_schema() {
        let service = seeded_service().await;
        let schema = service.table_schema("regions").await.unwrap();
        assert_eq!(schema.columns[1].name, "name");
        assert!(matches!(
            service.table_schema("nope").await,
            Err(FinchError::NotFound(_))
        ));
    }
}
