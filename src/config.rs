//! Configuration loader for the `airsense-service` backend.
//!
//! This module centralizes all runtime configuration values and their
//! defaults, loading from environment variables (with optional `.env` file
//! support provided by the caller). File contents (whitelist, thresholds,
//! historical CSV) are read by their owning modules; only the paths live here.
//!
use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Parse an optional path environment variable with a default value.
macro_rules! path_env {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from($default))
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string for the ingestion log.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Port the HTTP listener binds on all interfaces.
    pub listen_port: u16,

    /// Sensor whitelist (JSON array).
    pub sensors_file: PathBuf,

    /// Pollutant thresholds (JSON object); built-in defaults when unset.
    pub thresholds_file: Option<PathBuf>,

    /// Historical readings export (CSV).
    pub historical_data_file: PathBuf,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `LISTEN_PORT` – HTTP port (default: 8080)
/// - `SENSORS_FILE` – whitelist path (default: `config/sensors.json`)
/// - `THRESHOLDS_FILE` – thresholds path (default: built-in thresholds)
/// - `HISTORICAL_DATA_FILE` – CSV path (default: `data/historical.csv`)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let listen_port = u16::try_from(parse_env_u32!("LISTEN_PORT", 8080))
        .map_err(|e| anyhow!("Invalid LISTEN_PORT: {}", e))?;
    let sensors_file = path_env!("SENSORS_FILE", "config/sensors.json");
    let thresholds_file = env::var("THRESHOLDS_FILE").ok().map(PathBuf::from);
    let historical_data_file = path_env!("HISTORICAL_DATA_FILE", "data/historical.csv");

    Ok(Config {
        db_url,
        db_pool_max,
        listen_port,
        sensors_file,
        thresholds_file,
        historical_data_file,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let thresholds = self
            .thresholds_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-in)".to_string());

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL         : {}", self.masked_db_url());
        tracing::info!("  DB_POOL_MAX          : {}", self.db_pool_max);
        tracing::info!("  LISTEN_PORT          : {}", self.listen_port);
        tracing::info!("  SENSORS_FILE         : {}", self.sensors_file.display());
        tracing::info!("  THRESHOLDS_FILE      : {}", thresholds);
        tracing::info!("  HISTORICAL_DATA_FILE : {}", self.historical_data_file.display());
    }

    /// The database URL with its password replaced by `****`.
    pub fn masked_db_url(&self) -> String {
        // ---
        let Some(at_pos) = self.db_url.rfind('@') else {
            return self.db_url.clone();
        };
        match self.db_url[..at_pos].rfind(':') {
            // `postgres://host` has a colon only in the scheme separator.
            Some(colon_pos) if !self.db_url[colon_pos..].starts_with("://") => format!(
                "{}:****{}",
                &self.db_url[..colon_pos],
                &self.db_url[at_pos..]
            ),
            _ => self.db_url.clone(),
        }
    }
}
