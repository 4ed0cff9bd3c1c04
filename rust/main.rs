use finch_sql::db::schema;
use finch_sql::db::seed::{self, SeedOptions};
use finch_sql::db::Row;
use finch_sql::{telemetry, AppConfig, ChatRequest, ChatResponse, ChatService, ProviderKind};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use std::io;
use tracing::info;

#[derive(Parser)]
#[command(name = "finch")]
#[command(about = "Ask questions about the ride-sharing warehouse in plain language")]
#[command(version)]
struct Args {
    /// Database URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question; SQL questions are answered with rows
    Ask {
        question: String,

        /// Provider to try first: groq, openai, gemini or local
        #[arg(short, long)]
        model: Option<ProviderKind>,

        /// Client identifier used for rate limiting
        #[arg(long, default_value = "cli")]
        client: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Show recent questions, newest first
    History {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Flag a history entry for human review
    Review {
        id: i64,

        #[arg(short, long, default_value = "")]
        feedback: String,
    },
    /// List tables with row counts
    Tables,
    /// Show a table's columns and first rows
    Table { name: String },
    /// Row counts and AI usage
    Stats,
    /// Check database connectivity
    Health,
    /// Create the schema, optionally filling it with synthetic data
    InitDb {
        #[arg(long)]
        seed: bool,

        /// Drop every table first
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    telemetry::init(&args.log);

    let mut config = AppConfig::from_env()?;
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    let service = ChatService::from_config(&config)
        .await
        .context("failed to open the warehouse")?;

    match args.command {
        Commands::Ask { question, model, client, format } => {
            let mut request = ChatRequest::new(question);
            request.model = model;
            let response = service.chat(&request, &client).await?;
            print_answer(&response, format)
        }
        Commands::History { limit } => print_json(&service.history(Some(limit)).await?),
        Commands::Review { id, feedback } => {
            service.request_review(id, &feedback).await?;
            println!("Query {} marked for review", id);
            Ok(())
        }
        Commands::Tables => print_json(&service.tables().await?),
        Commands::Table { name } => print_json(&service.table_preview(&name).await?),
        Commands::Stats => print_json(&service.stats().await?),
        Commands::Health => print_json(&service.health().await),
        Commands::InitDb { seed: with_data, reset } => {
            let warehouse = service.warehouse();
            let dialect = warehouse.dialect();
            if reset {
                info!("Dropping existing tables");
                warehouse.run_statements(&schema::drop_statements(dialect)).await?;
            }
            if with_data {
                let summary = seed::seed(warehouse.as_ref(), &SeedOptions::default()).await?;
                for (table, rows) in &summary.tables {
                    println!("{:<24} {}", table, rows);
                }
            } else {
                warehouse.run_statements(&schema::create_statements(dialect)).await?;
            }
            println!("Database initialized ({})", dialect.display_name());
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_answer(response: &ChatResponse, format: OutputFormat) -> Result<()> {
    let rows = match (format, &response.results) {
        (OutputFormat::Json, _) | (_, None) => return print_json(response),
        (_, Some(rows)) => rows,
    };

    if let Some(sql) = &response.sql {
        eprintln!("{}", sql);
    }
    match format {
        OutputFormat::Csv => write_csv(rows),
        _ => {
            print_table(rows);
            Ok(())
        }
    }
}

fn headers(rows: &[Row]) -> Vec<String> {
    rows.first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default()
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn write_csv(rows: &[Row]) -> Result<()> {
    let headers = headers(rows);
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(&headers)?;
    for row in rows {
        writer.write_record(headers.iter().map(|h| cell(row.get(h))))?;
    }
    writer.flush()?;
    Ok(())
}

fn print_table(rows: &[Row]) {
    let headers = headers(rows);
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| headers.iter().map(|h| cell(row.get(h))).collect())
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("{}", line(&headers));
    println!(
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for row in &cells {
        println!("{}", line(row));
    }
    println!("({} rows)", rows.len());
}
