//! Error taxonomy for the sensor state and analytics core.
//!
//! Every failure the core can report to a caller is a variant of
//! [`CoreError`]. Persistence problems are kept in their own [`StoreError`]
//! so the gateway implementation can change without touching the domain.

use thiserror::Error;

// ---

/// Failures raised by the persistence gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    // ---
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Classified failures of the core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    // ---
    /// A point-geometry string did not match `POINT(lon lat)` or its
    /// coordinates were out of range.
    #[error("invalid geometry '{input}': {reason}")]
    InvalidGeometry { input: String, reason: String },

    /// Ingestion attempted by an id that is not on the whitelist.
    #[error("sensor '{0}' is not authorized to ingest")]
    UnauthorizedSensor(String),

    /// Year/month outside the accepted range.
    #[error("invalid period {year}-{month:02}")]
    InvalidPeriod { year: i32, month: u32 },

    /// Unknown sensor, or a sensor without historical rows.
    #[error("sensor '{0}' not found or has no historical data")]
    NotFound(String),

    /// No readings for the requested year/month.
    #[error("no data for {year}-{month:02}")]
    NoData { year: i32, month: u32 },

    /// Startup produced no usable sensors.
    #[error("sensor registry is empty: no valid sensors were configured")]
    EmptyRegistry,

    /// The persistence gateway rejected an append.
    #[error("failed to persist reading: {0}")]
    Persistence(#[from] StoreError),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
