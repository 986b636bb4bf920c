//! Application entry point for the `airsense-service` backend.
//!
//! This binary orchestrates the full startup sequence for the air-quality
//! sensor service, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Building the sensor registry from the whitelist (invalid geometries are
//!   logged and skipped)
//! - Loading and cleaning the historical dataset (blocking; the service is
//!   not ready until this finishes)
//! - Connecting to PostgreSQL, creating the schema and restoring live state
//!   from the persisted ingestion log
//! - Mounting all API routes via the `routes` gateway and serving requests
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `DB_POOL_MAX`, `LISTEN_PORT`, `SENSORS_FILE`, `THRESHOLDS_FILE`,
//!   `HISTORICAL_DATA_FILE` (optional) – see `config.rs`
//! - `AIRSENSE_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AIRSENSE_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! Every piece of shared state is constructed here once and passed down
//! explicitly; there are no process-wide singletons.
use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

mod analytics;
mod cleaning;
mod config;
mod dataset;
mod error;
mod geometry;
mod history;
mod ingest;
mod models;
mod registry;
mod routes;
mod schema;
mod store;
mod thresholds;

// Re-exported for routes/*.rs so the handlers only depend on their parent
// module (main.rs), not on where each type lives.
pub use analytics::{AggregationEngine, AggregationResult, MapMarker, StatusSnapshot, TimeSeries};
pub use error::CoreError;
pub use ingest::IngestionService;
pub use models::{Confirmation, IngestRequest};

use registry::SensorRegistry;
use store::PgReadingStore;
use thresholds::ThresholdConfig;

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let thresholds = match &cfg.thresholds_file {
        Some(path) => ThresholdConfig::load(path)?,
        None => ThresholdConfig::default(),
    };
    tracing::info!("Thresholds: {:?}", thresholds);

    let whitelist = registry::load_whitelist(&cfg.sensors_file)?;
    let registry = Arc::new(SensorRegistry::from_whitelist(whitelist)?);

    let historical_path = cfg.historical_data_file.clone();
    let dataset = tokio::task::spawn_blocking(move || history::load_cleaned(&historical_path))
        .await
        .context("Historical data loader panicked")??;
    if dataset.is_empty() {
        tracing::warn!("Historical dataset is empty; history and distribution will report no data");
    } else {
        tracing::info!("Historical dataset ready: {} readings", dataset.len());
    }

    tracing::info!("Attempting to connect to database: {}", cfg.masked_db_url());

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| {
            anyhow::anyhow!("Failed to connect to database '{}': {}", cfg.masked_db_url(), e)
        })?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let store = Arc::new(PgReadingStore::new(pool));
    let ingestion = Arc::new(IngestionService::new(registry.clone(), store));
    ingestion
        .hydrate()
        .await
        .context("Failed to restore state from persisted readings")?;

    let analytics = Arc::new(AggregationEngine::new(
        Arc::new(dataset),
        registry,
        Arc::new(thresholds),
    ));

    // Build app from routes gateway
    let app: Router = routes::router(routes::AppState {
        ingestion,
        analytics,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AIRSENSE_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, falling back to `AIRSENSE_LOG_LEVEL`
///
/// Called once at startup before any logging macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("AIRSENSE_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AIRSENSE_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
