//! DDL for the ride-sharing warehouse, rendered for either dialect.

use super::Dialect;

pub const TRANSACTIONAL_TABLES: &[&str] = &[
    "regions",
    "users",
    "vehicles",
    "drivers",
    "payments",
    "promotions",
    "trips",
    "ratings",
    "surge_pricing",
    "support_tickets",
];

pub const FLATTENED_TABLES: &[&str] = &["trip_metrics_daily", "region_revenue_summary"];

pub const BOOKKEEPING_TABLES: &[&str] = &["golden_queries", "metadata_index", "query_history"];

// Placeholders: {PK} primary key, {FLOAT} double column, {TS} plain
// timestamp, {TSTZ} zoned timestamp.
const TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS regions (
        id {PK},
        name VARCHAR(255) NOT NULL,
        code VARCHAR(50) NOT NULL UNIQUE,
        country VARCHAR(100) NOT NULL,
        city VARCHAR(100),
        timezone VARCHAR(50) DEFAULT 'UTC',
        is_active BOOLEAN DEFAULT TRUE,
        created_at {TS} DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS users (
        id {PK},
        email VARCHAR(255) NOT NULL UNIQUE,
        name VARCHAR(255) NOT NULL,
        phone VARCHAR(50),
        created_at {TS} NOT NULL DEFAULT CURRENT_TIMESTAMP,
        is_active BOOLEAN DEFAULT TRUE,
        total_trips INTEGER DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS vehicles (
        id {PK},
        license_plate VARCHAR(50) NOT NULL UNIQUE,
        make VARCHAR(100) NOT NULL,
        model VARCHAR(100) NOT NULL,
        year INTEGER NOT NULL,
        color VARCHAR(50),
        vehicle_type VARCHAR(50) NOT NULL,
        is_active BOOLEAN DEFAULT TRUE,
        created_at {TS} DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS drivers (
        id {PK},
        name VARCHAR(255) NOT NULL,
        email VARCHAR(255) NOT NULL UNIQUE,
        phone VARCHAR(50) NOT NULL,
        license_number VARCHAR(100) NOT NULL UNIQUE,
        region_id INTEGER NOT NULL REFERENCES regions(id),
        vehicle_id INTEGER REFERENCES vehicles(id),
        rating {FLOAT} DEFAULT 5.0,
        is_active BOOLEAN DEFAULT TRUE,
        created_at {TS} NOT NULL DEFAULT CURRENT_TIMESTAMP,
        total_trips INTEGER DEFAULT 0,
        total_earnings NUMERIC(10, 2) DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS payments (
        id {PK},
        amount NUMERIC(10, 2) NOT NULL,
        payment_method VARCHAR(50) NOT NULL,
        status VARCHAR(50) NOT NULL DEFAULT 'completed',
        transaction_id VARCHAR(255) UNIQUE,
        created_at {TS} NOT NULL DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS promotions (
        id {PK},
        code VARCHAR(50) NOT NULL UNIQUE,
        description TEXT,
        discount_type VARCHAR(50) NOT NULL,
        discount_value NUMERIC(10, 2) NOT NULL,
        max_discount NUMERIC(10, 2),
        min_trip_amount NUMERIC(10, 2),
        start_date {TS} NOT NULL,
        end_date {TS} NOT NULL,
        is_active BOOLEAN DEFAULT TRUE,
        usage_count INTEGER DEFAULT 0,
        created_at {TS} DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS trips (
        id {PK},
        user_id INTEGER NOT NULL REFERENCES users(id),
        driver_id INTEGER NOT NULL REFERENCES drivers(id),
        vehicle_id INTEGER NOT NULL REFERENCES vehicles(id),
        region_id INTEGER NOT NULL REFERENCES regions(id),
        pickup_location VARCHAR(255) NOT NULL,
        dropoff_location VARCHAR(255) NOT NULL,
        pickup_time {TS} NOT NULL,
        dropoff_time {TS},
        distance_km {FLOAT} NOT NULL,
        duration_minutes INTEGER,
        base_fare NUMERIC(10, 2) NOT NULL,
        surge_multiplier {FLOAT} DEFAULT 1.0,
        total_fare NUMERIC(10, 2) NOT NULL,
        status VARCHAR(50) NOT NULL DEFAULT 'completed',
        payment_id INTEGER REFERENCES payments(id),
        promotion_id INTEGER REFERENCES promotions(id),
        created_at {TS} NOT NULL DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS ratings (
        id {PK},
        trip_id INTEGER NOT NULL UNIQUE REFERENCES trips(id),
        user_id INTEGER NOT NULL REFERENCES users(id),
        driver_id INTEGER NOT NULL REFERENCES drivers(id),
        user_rating INTEGER NOT NULL CHECK (user_rating >= 1 AND user_rating <= 5),
        driver_rating INTEGER NOT NULL CHECK (driver_rating >= 1 AND driver_rating <= 5),
        user_comment TEXT,
        driver_comment TEXT,
        created_at {TS} NOT NULL DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS surge_pricing (
        id {PK},
        region_id INTEGER NOT NULL REFERENCES regions(id),
        area VARCHAR(255) NOT NULL,
        surge_multiplier {FLOAT} NOT NULL CHECK (surge_multiplier >= 1.0),
        start_time {TS} NOT NULL,
        end_time {TS},
        reason VARCHAR(255),
        is_active BOOLEAN DEFAULT TRUE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS support_tickets (
        id {PK},
        user_id INTEGER NOT NULL REFERENCES users(id),
        trip_id INTEGER REFERENCES trips(id),
        subject VARCHAR(255) NOT NULL,
        description TEXT NOT NULL,
        category VARCHAR(100) NOT NULL,
        status VARCHAR(50) NOT NULL DEFAULT 'open',
        priority VARCHAR(50) DEFAULT 'medium',
        created_at {TS} NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at {TS} DEFAULT CURRENT_TIMESTAMP,
        resolved_at {TS}
    )"#,
    r#"CREATE TABLE IF NOT EXISTS trip_metrics_daily (
        id {PK},
        date DATE NOT NULL,
        region_id INTEGER NOT NULL REFERENCES regions(id),
        total_trips INTEGER DEFAULT 0,
        completed_trips INTEGER DEFAULT 0,
        cancelled_trips INTEGER DEFAULT 0,
        total_revenue NUMERIC(12, 2) DEFAULT 0,
        avg_trip_distance {FLOAT} DEFAULT 0,
        avg_trip_duration {FLOAT} DEFAULT 0,
        avg_fare NUMERIC(10, 2) DEFAULT 0,
        unique_users INTEGER DEFAULT 0,
        unique_drivers INTEGER DEFAULT 0,
        surge_trips INTEGER DEFAULT 0,
        promo_trips INTEGER DEFAULT 0,
        created_at {TS} DEFAULT CURRENT_TIMESTAMP,
        updated_at {TS} DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS region_revenue_summary (
        id {PK},
        region_id INTEGER NOT NULL REFERENCES regions(id),
        year INTEGER NOT NULL,
        month INTEGER NOT NULL,
        total_revenue NUMERIC(12, 2) DEFAULT 0,
        total_trips INTEGER DEFAULT 0,
        total_distance_km {FLOAT} DEFAULT 0,
        active_users INTEGER DEFAULT 0,
        active_drivers INTEGER DEFAULT 0,
        avg_rating {FLOAT} DEFAULT 0,
        support_tickets INTEGER DEFAULT 0,
        created_at {TS} DEFAULT CURRENT_TIMESTAMP,
        updated_at {TS} DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS golden_queries (
        id {PK},
        question TEXT NOT NULL,
        sql_query TEXT NOT NULL,
        expected_result_hash VARCHAR(255),
        description TEXT,
        category VARCHAR(100),
        is_active BOOLEAN DEFAULT TRUE,
        created_at {TS} DEFAULT CURRENT_TIMESTAMP,
        last_validated {TS}
    )"#,
    r#"CREATE TABLE IF NOT EXISTS metadata_index (
        id {PK},
        table_name VARCHAR(255) NOT NULL,
        column_name VARCHAR(255),
        display_name VARCHAR(255),
        description TEXT,
        business_term VARCHAR(255),
        data_type VARCHAR(100),
        is_metric BOOLEAN DEFAULT FALSE,
        metric_definition TEXT,
        example_values TEXT,
        created_at {TS} DEFAULT CURRENT_TIMESTAMP,
        updated_at {TS} DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE TABLE IF NOT EXISTS query_history (
        id {PK},
        user_question TEXT NOT NULL,
        generated_sql TEXT,
        execution_result TEXT,
        confidence_score {FLOAT},
        trust_score {FLOAT},
        agent_used VARCHAR(100),
        error_message TEXT,
        execution_time_ms INTEGER,
        is_reviewed BOOLEAN DEFAULT FALSE,
        review_feedback TEXT,
        created_at {TSTZ} NOT NULL DEFAULT CURRENT_TIMESTAMP
    )"#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_users_email_active ON users (email, is_active)",
    "CREATE INDEX IF NOT EXISTS idx_drivers_region_active ON drivers (region_id, is_active)",
    "CREATE INDEX IF NOT EXISTS idx_trips_region_date ON trips (region_id, pickup_time)",
    "CREATE INDEX IF NOT EXISTS idx_trips_user_date ON trips (user_id, pickup_time)",
    "CREATE INDEX IF NOT EXISTS idx_trips_status ON trips (status)",
    "CREATE INDEX IF NOT EXISTS idx_payments_status_date ON payments (status, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_promotions_active_dates ON promotions (is_active, start_date, end_date)",
    "CREATE INDEX IF NOT EXISTS idx_ratings_driver_date ON ratings (driver_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_surge_region_time ON surge_pricing (region_id, start_time)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_status_priority ON support_tickets (status, priority)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_category_date ON support_tickets (category, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_metrics_region_date ON trip_metrics_daily (region_id, date)",
    "CREATE INDEX IF NOT EXISTS idx_revenue_region_year_month ON region_revenue_summary (region_id, year, month)",
    "CREATE INDEX IF NOT EXISTS idx_golden_category_active ON golden_queries (category, is_active)",
    "CREATE INDEX IF NOT EXISTS idx_metadata_table_column ON metadata_index (table_name, column_name)",
    "CREATE INDEX IF NOT EXISTS idx_query_history_date ON query_history (created_at)",
];

/// Every CREATE TABLE / CREATE INDEX statement, parents before children.
pub fn create_statements(dialect: Dialect) -> Vec<String> {
    TABLES
        .iter()
        .map(|ddl| render(ddl, dialect))
        .chain(INDEXES.iter().map(|ddl| ddl.to_string()))
        .collect()
}

/// DROP statements in reverse dependency order.
pub fn drop_statements(dialect: Dialect) -> Vec<String> {
    let cascade = match dialect {
        Dialect::Postgres => " CASCADE",
        Dialect::Sqlite => "",
    };
    all_tables()
        .rev()
        .map(|table| format!("DROP TABLE IF EXISTS {}{}", table, cascade))
        .collect()
}

/// Table names in creation order.
pub fn all_tables() -> impl DoubleEndedIterator<Item = &'static str> {
    TRANSACTIONAL_TABLES
        .iter()
        .chain(FLATTENED_TABLES)
        .chain(BOOKKEEPING_TABLES)
        .copied()
}

fn render(ddl: &str, dialect: Dialect) -> String {
    let (pk, float, ts, tstz) = match dialect {
        Dialect::Postgres => ("SERIAL PRIMARY KEY", "DOUBLE PRECISION", "TIMESTAMP", "TIMESTAMPTZ"),
        Dialect::Sqlite => ("INTEGER PRIMARY KEY AUTOINCREMENT", "REAL", "TIMESTAMP", "TIMESTAMP"),
    };
    ddl.replace("{PK}", pk)
        .replace("{FLOAT}", float)
        .replace("{TSTZ}", tstz)
        .replace("{TS}", ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SqliteWarehouse, Warehouse};

    #[test]
    fn test_render_per_dialect() {
        let pg = create_statements(Dialect::Postgres);
        assert!(pg[0].contains("SERIAL PRIMARY KEY"));
        assert!(pg.iter().any(|s| s.contains("created_at TIMESTAMPTZ")));

        let lite = create_statements(Dialect::Sqlite);
        assert!(lite[0].contains("AUTOINCREMENT"));
        assert!(lite.iter().all(|s| !s.contains('{')));
    }

    #[test]
    fn test_drop_order_is_reversed() {
        let drops = drop_statements(Dialect::Sqlite);
        assert_eq!(drops.first().unwrap(), "DROP TABLE IF EXISTS query_history");
        assert_eq!(drops.last().unwrap(), "DROP TABLE IF EXISTS regions");
    }

    #[tokio::test]
    async fn test_schema_applies_to_sqlite() {
        let warehouse = SqliteWarehouse::in_memory().unwrap();
        warehouse
            .run_statements(&create_statements(Dialect::Sqlite))
            .await
            .unwrap();
        // idempotent
        warehouse
            .run_statements(&create_statements(Dialect::Sqlite))
            .await
            .unwrap();

        let names = warehouse.table_names().await.unwrap();
        for table in all_tables() {
            assert!(names.iter().any(|n| n == table), "missing {}", table);
        }
    }
}
