//! Deterministic synthetic data for the ride-sharing warehouse.
//!
//! Row ids are not written explicitly; the seed assumes empty tables so the
//! generated ids run 1..=n and foreign keys can be computed up front.

use super::{quote_literal, schema, Dialect, Warehouse};
use crate::error::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

const INSERT_CHUNK: usize = 200;

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub users: usize,
    pub vehicles: usize,
    pub drivers: usize,
    pub promotions: usize,
    pub payments: usize,
    pub trips: usize,
    pub ratings: usize,
    pub surge_events: usize,
    pub support_tickets: usize,
    pub metric_days: i64,
    pub rng_seed: u64,
    pub reference: DateTime<Utc>,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            users: 1000,
            vehicles: 1000,
            drivers: 1000,
            promotions: 50,
            payments: 1000,
            trips: 1000,
            ratings: 800,
            surge_events: 200,
            support_tickets: 300,
            metric_days: 90,
            rng_seed: 42,
            reference: Utc::now(),
        }
    }
}

impl SeedOptions {
    /// A handful of rows per table, for tests and demos.
    pub fn small() -> Self {
        Self {
            users: 20,
            vehicles: 10,
            drivers: 10,
            promotions: 5,
            payments: 30,
            trips: 30,
            ratings: 20,
            surge_events: 5,
            support_tickets: 5,
            metric_days: 7,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedSummary {
    pub tables: Vec<(String, usize)>,
}

impl SeedSummary {
    fn record(&mut self, table: &str, rows: usize) {
        info!("Seeded {} rows into {}", rows, table);
        self.tables.push((table.to_string(), rows));
    }

    pub fn rows_for(&self, table: &str) -> Option<usize> {
        self.tables.iter().find(|(t, _)| t == table).map(|(_, n)| *n)
    }
}

/// Create the schema if needed, then fill it unless `regions` already has rows.
pub async fn seed(warehouse: &dyn Warehouse, options: &SeedOptions) -> Result<SeedSummary> {
    let dialect = warehouse.dialect();
    warehouse.run_statements(&schema::create_statements(dialect)).await?;

    let existing = warehouse
        .run_query("SELECT COUNT(*) AS n FROM regions", std::time::Duration::from_secs(30))
        .await?;
    let already = existing
        .first()
        .and_then(|row| row.get("n"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    if already > 0 {
        info!("Warehouse already seeded ({} regions), skipping", already);
        return Ok(SeedSummary::default());
    }

    let mut generator = Generator::new(options);
    let mut summary = SeedSummary::default();
    let mut statements = Vec::new();

    for table in generator.tables(dialect) {
        summary.record(table.name, table.rows.len());
        statements.extend(table.into_inserts());
    }

    warehouse.run_statements(&statements).await?;
    info!("Seed complete: {} statements", statements.len());
    Ok(summary)
}

struct TableRows {
    name: &'static str,
    columns: &'static [&'static str],
    rows: Vec<Vec<String>>,
}

impl TableRows {
    fn new(name: &'static str, columns: &'static [&'static str]) -> Self {
        Self {
            name,
            columns,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.rows.push(values);
    }

    fn into_inserts(self) -> Vec<String> {
        let header = format!("INSERT INTO {} ({}) VALUES ", self.name, self.columns.join(", "));
        self.rows
            .chunks(INSERT_CHUNK)
            .map(|chunk| {
                let values: Vec<String> = chunk
                    .iter()
                    .map(|row| format!("({})", row.join(", ")))
                    .collect();
                format!("{}{}", header, values.join(", "))
            })
            .collect()
    }
}

const REGIONS: &[(&str, &str, &str, &str, &str)] = &[
    ("US and Canada", "USNC", "USA", "New York", "America/New_York"),
    ("United States West", "USW", "USA", "San Francisco", "America/Los_Angeles"),
    ("Europe", "EU", "UK", "London", "Europe/London"),
    ("Asia Pacific", "APAC", "Singapore", "Singapore", "Asia/Singapore"),
    ("Latin America", "LATAM", "Brazil", "Sao Paulo", "America/Sao_Paulo"),
];

const FIRST_NAMES: &[&str] = &[
    "Ava", "Ben", "Chloe", "Diego", "Elena", "Farid", "Grace", "Hiro", "Isla", "Jonas", "Kemi",
    "Liam", "Maya", "Noah", "Olga", "Priya", "Quinn", "Rosa", "Sven", "Tara",
];
const LAST_NAMES: &[&str] = &[
    "Anders", "Brooks", "Costa", "Dubois", "Evans", "Fischer", "Garcia", "Hughes", "Ito", "Jensen",
    "Kim", "Lopez", "Murphy", "Nakamura", "Okafor", "Patel", "Rossi", "Silva", "Tanaka", "Weber",
];
const STREETS: &[&str] = &[
    "Main St", "Oak Ave", "Harbor Rd", "Market St", "Station Sq", "Hill Rd", "Park Ln", "River Walk",
];
const MAKES: &[&str] = &[
    "Toyota", "Honda", "Ford", "Tesla", "BMW", "Mercedes", "Audi", "Hyundai", "Nissan", "Chevrolet",
];
const MODELS: &[&str] = &[
    "Camry", "Accord", "Model 3", "Civic", "Corolla", "Prius", "X5", "E-Class", "A4", "Elantra",
];
const COLORS: &[&str] = &["White", "Black", "Silver", "Gray", "Blue", "Red"];
const VEHICLE_TYPES: &[&str] = &["sedan", "suv", "premium", "economy"];
const PAYMENT_METHODS: &[&str] = &["credit_card", "debit_card", "cash", "wallet"];
const PAYMENT_STATUSES: &[&str] = &["completed", "completed", "completed", "pending", "failed"];
const TRIP_STATUSES: &[&str] = &["completed", "completed", "completed", "cancelled"];
const SURGES: &[f64] = &[1.0, 1.0, 1.0, 1.2, 1.5, 2.0];
const SURGE_REASONS: &[&str] = &["high_demand", "event", "weather", "rush_hour", "concert", "sports_event"];
const TICKET_CATEGORIES: &[&str] = &["payment", "driver", "safety", "trip_issue", "app", "other"];
const TICKET_STATUSES: &[&str] = &["open", "in_progress", "resolved", "closed"];
const PRIORITIES: &[&str] = &["low", "medium", "high", "urgent"];
const TICKET_SUBJECTS: &[&str] = &[
    "Charged twice for one ride",
    "Driver took a longer route",
    "Lost item in vehicle",
    "App crashed during booking",
    "Promo code not applied",
    "Unsafe driving reported",
];

struct Generator<'a> {
    rng: StdRng,
    options: &'a SeedOptions,
    now: NaiveDateTime,
}

impl<'a> Generator<'a> {
    fn new(options: &'a SeedOptions) -> Self {
        Self {
            rng: StdRng::seed_from_u64(options.rng_seed),
            options,
            now: options.reference.naive_utc(),
        }
    }

    fn tables(&mut self, dialect: Dialect) -> Vec<TableRows> {
        let trips = self.trips();
        let trip_refs: Vec<TripRef> = trips.1.clone();
        vec![
            self.regions(),
            self.users(),
            self.vehicles(),
            self.drivers(),
            self.payments(),
            self.promotions(),
            trips.0,
            self.ratings(&trip_refs),
            self.surge_pricing(),
            self.support_tickets(&trip_refs),
            self.trip_metrics_daily(),
            self.region_revenue_summary(),
            golden_queries(dialect, self.options.reference.date_naive()),
            metadata_entries(),
        ]
    }

    fn name(&mut self) -> String {
        format!(
            "{} {}",
            FIRST_NAMES.choose(&mut self.rng).copied().unwrap_or("Alex"),
            LAST_NAMES.choose(&mut self.rng).copied().unwrap_or("Smith")
        )
    }

    fn pick(&mut self, items: &[&str]) -> String {
        quote_literal(items.choose(&mut self.rng).copied().unwrap_or_default())
    }

    fn phone(&mut self) -> String {
        quote_literal(&format!(
            "+1-{:03}-{:03}-{:04}",
            self.rng.gen_range(200..999),
            self.rng.gen_range(100..999),
            self.rng.gen_range(0..9999)
        ))
    }

    fn active(&mut self) -> String {
        // three in four rows are active
        bool_literal(self.rng.gen_range(0..4) != 0)
    }

    /// A timestamp uniformly within the last `days` days.
    fn past(&mut self, days: i64) -> NaiveDateTime {
        let secs = self.rng.gen_range(0..days.max(1) * 86_400);
        self.now - Duration::seconds(secs)
    }

    fn id(&mut self, count: usize) -> usize {
        self.rng.gen_range(1..=count.max(1))
    }

    fn address(&mut self) -> String {
        let number = self.rng.gen_range(1..2000);
        let street = STREETS.choose(&mut self.rng).copied().unwrap_or("Main St");
        quote_literal(&format!("{} {}", number, street))
    }

    fn regions(&mut self) -> TableRows {
        let mut table = TableRows::new(
            "regions",
            &["name", "code", "country", "city", "timezone", "is_active"],
        );
        for (name, code, country, city, tz) in REGIONS {
            table.push(vec![
                quote_literal(name),
                quote_literal(code),
                quote_literal(country),
                quote_literal(city),
                quote_literal(tz),
                bool_literal(true),
            ]);
        }
        table
    }

    fn users(&mut self) -> TableRows {
        let mut table = TableRows::new(
            "users",
            &["email", "name", "phone", "created_at", "is_active", "total_trips"],
        );
        for i in 0..self.options.users {
            let name = self.name();
            let phone = self.phone();
            let created = self.past(730);
            let active = self.active();
            let total = self.rng.gen_range(0..=100);
            table.push(vec![
                quote_literal(&format!("user{}@example.com", i)),
                quote_literal(&name),
                phone,
                ts_literal(created),
                active,
                total.to_string(),
            ]);
        }
        table
    }

    fn vehicles(&mut self) -> TableRows {
        let mut table = TableRows::new(
            "vehicles",
            &[
                "license_plate", "make", "model", "year", "color", "vehicle_type", "is_active",
                "created_at",
            ],
        );
        for i in 0..self.options.vehicles {
            let plate = format!("FN-{:05}", i);
            let make = self.pick(MAKES);
            let model = self.pick(MODELS);
            let year = self.rng.gen_range(2015..=2024);
            let color = self.pick(COLORS);
            let kind = self.pick(VEHICLE_TYPES);
            let active = self.active();
            let created = self.past(730);
            table.push(vec![
                quote_literal(&plate),
                make,
                model,
                year.to_string(),
                color,
                kind,
                active,
                ts_literal(created),
            ]);
        }
        table
    }

    fn drivers(&mut self) -> TableRows {
        let mut table = TableRows::new(
            "drivers",
            &[
                "name", "email", "phone", "license_number", "region_id", "vehicle_id", "rating",
                "is_active", "created_at", "total_trips", "total_earnings",
            ],
        );
        for i in 0..self.options.drivers {
            let name = self.name();
            let phone = self.phone();
            let region = self.id(REGIONS.len());
            let vehicle = if i < self.options.vehicles {
                (i + 1).to_string()
            } else {
                "NULL".to_string()
            };
            let rating: f64 = self.rng.gen_range(3.5..=5.0);
            let active = self.active();
            let created = self.past(730);
            let trips = self.rng.gen_range(0..=500);
            let earnings: f64 = self.rng.gen_range(1000.0..50000.0);
            table.push(vec![
                quote_literal(&name),
                quote_literal(&format!("driver{}@finch.example", i)),
                phone,
                quote_literal(&format!("DL{:06}", i)),
                region.to_string(),
                vehicle,
                format!("{:.2}", rating),
                active,
                ts_literal(created),
                trips.to_string(),
                format!("{:.2}", earnings),
            ]);
        }
        table
    }

    fn payments(&mut self) -> TableRows {
        let mut table = TableRows::new(
            "payments",
            &["amount", "payment_method", "status", "transaction_id", "created_at"],
        );
        for _ in 0..self.options.payments {
            let amount: f64 = self.rng.gen_range(5.0..100.0);
            let method = self.pick(PAYMENT_METHODS);
            let status = self.pick(PAYMENT_STATUSES);
            let txn = uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid();
            let created = self.past(365);
            table.push(vec![
                format!("{:.2}", amount),
                method,
                status,
                quote_literal(&txn.to_string()),
                ts_literal(created),
            ]);
        }
        table
    }

    fn promotions(&mut self) -> TableRows {
        let mut table = TableRows::new(
            "promotions",
            &[
                "code", "description", "discount_type", "discount_value", "max_discount",
                "min_trip_amount", "start_date", "end_date", "is_active", "usage_count",
            ],
        );
        for i in 0..self.options.promotions {
            let start = self.past(365);
            let end = start + Duration::days(self.rng.gen_range(7..=90));
            let kind = self.pick(&["percentage", "fixed_amount"]);
            let value = [5, 10, 15, 20, 25][self.rng.gen_range(0..5)];
            let max = [10, 20, 50][self.rng.gen_range(0..3)];
            let min = [10, 20, 30][self.rng.gen_range(0..3)];
            let usage = self.rng.gen_range(0..=500);
            table.push(vec![
                quote_literal(&format!("PROMO{:03}", i)),
                quote_literal(&format!("{}% off selected rides", value)),
                kind,
                format!("{}.00", value),
                format!("{}.00", max),
                format!("{}.00", min),
                ts_literal(start),
                ts_literal(end),
                bool_literal(start <= self.now && self.now <= end),
                usage.to_string(),
            ]);
        }
        table
    }

    fn trips(&mut self) -> (TableRows, Vec<TripRef>) {
        let mut table = TableRows::new(
            "trips",
            &[
                "user_id", "driver_id", "vehicle_id", "region_id", "pickup_location",
                "dropoff_location", "pickup_time", "dropoff_time", "distance_km", "duration_minutes",
                "base_fare", "surge_multiplier", "total_fare", "status", "payment_id",
                "promotion_id",
            ],
        );
        let mut refs = Vec::with_capacity(self.options.trips);
        for i in 0..self.options.trips {
            let pickup = self.past(365);
            let duration = self.rng.gen_range(5..=90);
            let dropoff = pickup + Duration::minutes(duration);
            let distance = (self.rng.gen_range(1.0..50.0_f64) * 100.0).round() / 100.0;
            let base_fare = ((5.0 + distance * 1.5) * 100.0).round() / 100.0;
            let surge = SURGES.choose(&mut self.rng).copied().unwrap_or(1.0);
            let user = self.id(self.options.users);
            let driver = self.id(self.options.drivers);
            let vehicle = self.id(self.options.vehicles);
            let region = self.id(REGIONS.len());
            let from = self.address();
            let to = self.address();
            let status = self.pick(TRIP_STATUSES);
            let payment = if i < self.options.payments {
                (i + 1).to_string()
            } else {
                "NULL".to_string()
            };
            let promotion = if self.options.promotions > 0 && self.rng.gen_bool(0.2) {
                self.id(self.options.promotions).to_string()
            } else {
                "NULL".to_string()
            };

            refs.push(TripRef {
                id: i + 1,
                user,
                driver,
                dropoff,
            });
            table.push(vec![
                user.to_string(),
                driver.to_string(),
                vehicle.to_string(),
                region.to_string(),
                from,
                to,
                ts_literal(pickup),
                ts_literal(dropoff),
                format!("{:.2}", distance),
                duration.to_string(),
                format!("{:.2}", base_fare),
                format!("{:.1}", surge),
                format!("{:.2}", base_fare * surge),
                status,
                payment,
                promotion,
            ]);
        }
        (table, refs)
    }

    fn ratings(&mut self, trips: &[TripRef]) -> TableRows {
        let mut table = TableRows::new(
            "ratings",
            &[
                "trip_id", "user_id", "driver_id", "user_rating", "driver_rating", "user_comment",
                "driver_comment", "created_at",
            ],
        );
        let count = self.options.ratings.min(trips.len());
        let rated: Vec<&TripRef> = trips.choose_multiple(&mut self.rng, count).collect();
        for trip in rated {
            let user_rating = self.rng.gen_range(3..=5);
            let driver_rating = self.rng.gen_range(3..=5);
            let user_comment = if self.rng.gen_bool(0.3) {
                quote_literal("Smooth ride, friendly driver.")
            } else {
                "NULL".to_string()
            };
            let driver_comment = if self.rng.gen_bool(0.2) {
                quote_literal("Polite passenger.")
            } else {
                "NULL".to_string()
            };
            let created = trip.dropoff + Duration::minutes(self.rng.gen_range(5..=120));
            table.push(vec![
                trip.id.to_string(),
                trip.user.to_string(),
                trip.driver.to_string(),
                user_rating.to_string(),
                driver_rating.to_string(),
                user_comment,
                driver_comment,
                ts_literal(created),
            ]);
        }
        table
    }

    fn surge_pricing(&mut self) -> TableRows {
        let mut table = TableRows::new(
            "surge_pricing",
            &["region_id", "area", "surge_multiplier", "start_time", "end_time", "reason", "is_active"],
        );
        for _ in 0..self.options.surge_events {
            let region = self.id(REGIONS.len());
            let area = quote_literal(REGIONS[region - 1].3);
            let multiplier: f64 = self.rng.gen_range(1.2..=3.0);
            let start = self.past(182);
            let end = start + Duration::minutes(self.rng.gen_range(30..=180));
            let reason = self.pick(SURGE_REASONS);
            table.push(vec![
                region.to_string(),
                area,
                format!("{:.1}", multiplier),
                ts_literal(start),
                ts_literal(end),
                reason,
                bool_literal(false),
            ]);
        }
        table
    }

    fn support_tickets(&mut self, trips: &[TripRef]) -> TableRows {
        let mut table = TableRows::new(
            "support_tickets",
            &[
                "user_id", "trip_id", "subject", "description", "category", "status", "priority",
                "created_at", "updated_at", "resolved_at",
            ],
        );
        for _ in 0..self.options.support_tickets {
            let created = self.past(182);
            let status = TICKET_STATUSES.choose(&mut self.rng).copied().unwrap_or("open");
            let subject = TICKET_SUBJECTS.choose(&mut self.rng).copied().unwrap_or("Other");
            let user = self.id(self.options.users);
            let trip = match trips.choose(&mut self.rng) {
                Some(t) if self.rng.gen_bool(0.7) => t.id.to_string(),
                _ => "NULL".to_string(),
            };
            let category = self.pick(TICKET_CATEGORIES);
            let priority = self.pick(PRIORITIES);
            let updated = created + Duration::hours(self.rng.gen_range(1..=48));
            let resolved = if matches!(status, "resolved" | "closed") {
                ts_literal(created + Duration::days(self.rng.gen_range(1..=7)))
            } else {
                "NULL".to_string()
            };
            table.push(vec![
                user.to_string(),
                trip,
                quote_literal(subject),
                quote_literal(&format!("Customer reported: {}.", subject.to_lowercase())),
                category,
                quote_literal(status),
                priority,
                ts_literal(created),
                ts_literal(updated),
                resolved,
            ]);
        }
        table
    }

    /// One row per region per day, ending yesterday.
    fn trip_metrics_daily(&mut self) -> TableRows {
        let mut table = TableRows::new(
            "trip_metrics_daily",
            &[
                "date", "region_id", "total_trips", "completed_trips", "cancelled_trips",
                "total_revenue", "avg_trip_distance", "avg_trip_duration", "avg_fare",
                "unique_users", "unique_drivers", "surge_trips", "promo_trips",
            ],
        );
        let today = self.options.reference.date_naive();
        for offset in (1..=self.options.metric_days).rev() {
            let date = today - Duration::days(offset);
            for region in 1..=REGIONS.len() {
                let total_trips = self.rng.gen_range(100..=500);
                let completed = self.rng.gen_range(80..=450);
                let cancelled = self.rng.gen_range(5..=50);
                let revenue: f64 = self.rng.gen_range(5000.0..25000.0);
                let distance: f64 = self.rng.gen_range(5.0..20.0);
                let duration: f64 = self.rng.gen_range(15.0..45.0);
                let fare: f64 = self.rng.gen_range(15.0..40.0);
                let users = self.rng.gen_range(50..=300);
                let drivers = self.rng.gen_range(30..=150);
                let surge = self.rng.gen_range(10..=100);
                let promo = self.rng.gen_range(20..=150);
                table.push(vec![
                    date_literal(date),
                    region.to_string(),
                    total_trips.to_string(),
                    completed.to_string(),
                    cancelled.to_string(),
                    format!("{:.2}", revenue),
                    format!("{:.2}", distance),
                    format!("{:.2}", duration),
                    format!("{:.2}", fare),
                    users.to_string(),
                    drivers.to_string(),
                    surge.to_string(),
                    promo.to_string(),
                ]);
            }
        }
        table
    }

    /// Monthly rows from January 2024 through the reference month.
    fn region_revenue_summary(&mut self) -> TableRows {
        let mut table = TableRows::new(
            "region_revenue_summary",
            &[
                "region_id", "year", "month", "total_revenue", "total_trips", "total_distance_km",
                "active_users", "active_drivers", "avg_rating", "support_tickets",
            ],
        );
        let today = self.options.reference.date_naive();
        let (last_year, last_month) = (today.year(), today.month());
        for year in 2024..=last_year {
            for month in 1..=12u32 {
                if year == last_year && month > last_month {
                    break;
                }
                for region in 1..=REGIONS.len() {
                    let revenue: f64 = self.rng.gen_range(100_000.0..500_000.0);
                    let trips = self.rng.gen_range(2000..=10000);
                    let distance: f64 = self.rng.gen_range(20_000.0..100_000.0);
                    let users = self.rng.gen_range(500..=2000);
                    let drivers = self.rng.gen_range(200..=800);
                    let rating: f64 = self.rng.gen_range(4.0..4.9);
                    let tickets = self.rng.gen_range(50..=300);
                    table.push(vec![
                        region.to_string(),
                        year.to_string(),
                        month.to_string(),
                        format!("{:.2}", revenue),
                        trips.to_string(),
                        format!("{:.2}", distance),
                        users.to_string(),
                        drivers.to_string(),
                        format!("{:.2}", rating),
                        tickets.to_string(),
                    ]);
                }
            }
        }
        table
    }
}

#[derive(Debug, Clone)]
struct TripRef {
    id: usize,
    user: usize,
    driver: usize,
    dropoff: NaiveDateTime,
}

fn golden_queries(dialect: Dialect, today: NaiveDate) -> TableRows {
    let mut table = TableRows::new(
        "golden_queries",
        &["question", "sql_query", "description", "category", "is_active"],
    );
    let (year, month) = previous_month(today);
    let yesterday = match dialect {
        Dialect::Postgres => "CURRENT_DATE - INTERVAL '1 day'",
        Dialect::Sqlite => "date('now', '-1 day')",
    };

    let queries = [
        (
            "What is the total revenue for US and Canada region last month?".to_string(),
            format!(
                "SELECT SUM(total_revenue) as revenue FROM region_revenue_summary rrs \
                 JOIN regions r ON rrs.region_id = r.id \
                 WHERE r.code = 'USNC' AND rrs.year = {} AND rrs.month = {}",
                year, month
            ),
            format!("Total revenue for USNC region in {}-{:02}", year, month),
            "revenue",
        ),
        (
            "How many trips were completed yesterday?".to_string(),
            format!(
                "SELECT SUM(completed_trips) as total FROM trip_metrics_daily WHERE date = {}",
                yesterday
            ),
            "Total completed trips yesterday".to_string(),
            "trips",
        ),
        (
            "What is the average rating of drivers in APAC region?".to_string(),
            "SELECT AVG(rating) as avg_rating FROM drivers d \
             JOIN regions r ON d.region_id = r.id \
             WHERE r.code = 'APAC' AND d.is_active = true"
                .to_string(),
            "Average driver rating in Asia Pacific".to_string(),
            "ratings",
        ),
        (
            "Top 5 drivers by total earnings?".to_string(),
            "SELECT name, total_earnings FROM drivers WHERE is_active = true \
             ORDER BY total_earnings DESC LIMIT 5"
                .to_string(),
            "Top earning active drivers".to_string(),
            "drivers",
        ),
    ];

    for (question, sql, description, category) in queries {
        table.push(vec![
            quote_literal(&question),
            quote_literal(&sql),
            quote_literal(&description),
            quote_literal(category),
            bool_literal(true),
        ]);
    }
    table
}

fn metadata_entries() -> TableRows {
    let mut table = TableRows::new(
        "metadata_index",
        &[
            "table_name", "column_name", "display_name", "description", "business_term",
            "data_type", "is_metric", "metric_definition",
        ],
    );
    let entries: [(&str, &str, &str, &str, Option<&str>, Option<&str>, bool, Option<&str>); 7] = [
        (
            "regions",
            "code",
            "Region Code",
            "Unique code for geographic region",
            Some("USNC=US and Canada, EU=Europe, APAC=Asia Pacific, LATAM=Latin America"),
            None,
            false,
            None,
        ),
        (
            "trip_metrics_daily",
            "total_revenue",
            "Daily Revenue",
            "Total revenue for the day",
            None,
            None,
            true,
            Some("SUM of all trip fares"),
        ),
        (
            "trip_metrics_daily",
            "completed_trips",
            "Completed Trips",
            "Number of successfully completed trips",
            None,
            None,
            true,
            Some("COUNT of trips with status='completed'"),
        ),
        (
            "region_revenue_summary",
            "total_revenue",
            "Monthly Revenue",
            "Total monthly revenue by region",
            None,
            None,
            true,
            Some("SUM of all trip fares in the month"),
        ),
        (
            "region_revenue_summary",
            "active_users",
            "Active Users",
            "Number of users who took at least one trip",
            None,
            None,
            true,
            Some("COUNT DISTINCT users with trips in period"),
        ),
        (
            "trips",
            "total_fare",
            "Trip Fare",
            "Total fare charged for the trip including surge",
            None,
            Some("numeric"),
            false,
            None,
        ),
        (
            "trips",
            "surge_multiplier",
            "Surge Multiplier",
            "Multiplier applied during high demand (1.0 = no surge)",
            None,
            Some("float"),
            false,
            None,
        ),
    ];

    for (tbl, column, display, description, term, data_type, is_metric, definition) in entries {
        table.push(vec![
            quote_literal(tbl),
            quote_literal(column),
            quote_literal(display),
            quote_literal(description),
            opt_literal(term),
            opt_literal(data_type),
            bool_literal(is_metric),
            opt_literal(definition),
        ]);
    }
    table
}

fn previous_month(today: NaiveDate) -> (i32, u32) {
    if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    }
}

fn ts_literal(ts: NaiveDateTime) -> String {
    quote_literal(&ts.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn date_literal(date: NaiveDate) -> String {
    quote_literal(&date.format("%Y-%m-%d").to_string())
}

fn bool_literal(value: bool) -> String {
    if value { "TRUE" } else { "FALSE" }.to_string()
}

fn opt_literal(value: Option<&str>) -> String {
    value.map(quote_literal).unwrap_or_else(|| "NULL".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteWarehouse;
    use chrono::TimeZone;
    use std::time::Duration as StdDuration;

    fn fixed_options() -> SeedOptions {
        SeedOptions {
            reference: Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap(),
            ..SeedOptions::small()
        }
    }

    #[test]
    fn test_previous_month_wraps_year() {
        assert_eq!(previous_month(NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()), (2025, 12));
        assert_eq!(previous_month(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()), (2026, 2));
    }

    #[test]
    fn test_inserts_are_chunked() {
        let mut table = TableRows::new("t", &["a"]);
        for i in 0..450 {
            table.push(vec![i.to_string()]);
        }
        let inserts = table.into_inserts();
        assert_eq!(inserts.len(), 3);
        assert!(inserts[0].starts_with("INSERT INTO t (a) VALUES (0), (1)"));
    }

    #[test]
    fn test_golden_queries_follow_dialect() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let pg = golden_queries(Dialect::Postgres, today);
        assert!(pg.rows[1][1].contains("INTERVAL '1 day'"));
        assert!(pg.rows[0][1].contains("rrs.year = 2026 AND rrs.month = 2"));

        let lite = golden_queries(Dialect::Sqlite, today);
        assert!(lite.rows[1][1].contains("date(''now'', ''-1 day'')"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let options = fixed_options();
        let a: Vec<Vec<Vec<String>>> = Generator::new(&options)
            .tables(Dialect::Sqlite)
            .into_iter()
            .map(|t| t.rows)
            .collect();
        let b: Vec<Vec<Vec<String>>> = Generator::new(&options)
            .tables(Dialect::Sqlite)
            .into_iter()
            .map(|t| t.rows)
            .collect();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_seed_sqlite_warehouse() {
        let warehouse = SqliteWarehouse::in_memory().unwrap();
        let options = fixed_options();
        let summary = seed(&warehouse, &options).await.unwrap();

        assert_eq!(summary.rows_for("regions"), Some(5));
        assert_eq!(summary.rows_for("trip_metrics_daily"), Some(7 * 5));
        // Jan 2024 .. Mar 2026 is 27 months
        assert_eq!(summary.rows_for("region_revenue_summary"), Some(27 * 5));
        assert_eq!(summary.rows_for("golden_queries"), Some(4));
        assert_eq!(summary.rows_for("metadata_index"), Some(7));

        let rows = warehouse
            .run_query("SELECT COUNT(*) AS n FROM trips", StdDuration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(rows[0]["n"], serde_json::Value::from(30));

        let golden = warehouse.active_golden_queries().await.unwrap();
        assert_eq!(golden.len(), 4);
        for query in &golden {
            warehouse
                .run_query(&query.sql_query, StdDuration::from_secs(5))
                .await
                .unwrap();
        }

        // a second run leaves existing data alone
        let again = seed(&warehouse, &options).await.unwrap();
        assert!(again.tables.is_empty());
    }
}
