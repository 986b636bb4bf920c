//! Persistence gateway for ingested readings.
//!
//! The core only needs two things from storage: an append that either
//! succeeds durably or reports failure, and a full replay of what was
//! appended so live state survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{PollutantValues, Reading};

// ---

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Durably append one reading.
    async fn append(&self, reading: &Reading) -> Result<(), StoreError>;

    /// Every appended reading, oldest first. Readings with equal timestamps
    /// come back in append order.
    async fn load_all(&self) -> Result<Vec<Reading>, StoreError>;
}

/// Postgres-backed append-only log (`sensor_readings`, see `schema.rs`).
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct StoredReading {
    id: Uuid,
    sensor_id: String,
    readings: Json<PollutantValues>,
    recorded_at: DateTime<Utc>,
}

impl From<StoredReading> for Reading {
    fn from(row: StoredReading) -> Self {
        Reading {
            id: row.id,
            sensor_id: row.sensor_id,
            values: row.readings.0,
            timestamp: row.recorded_at,
        }
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    // ---
    async fn append(&self, reading: &Reading) -> Result<(), StoreError> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO sensor_readings (id, sensor_id, readings, recorded_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(reading.id)
        .bind(&reading.sensor_id)
        .bind(Json(&reading.values))
        .bind(reading.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Reading>, StoreError> {
        // ---
        let rows: Vec<StoredReading> = sqlx::query_as(
            r#"
            SELECT id, sensor_id, readings, recorded_at
            FROM sensor_readings
            ORDER BY recorded_at ASC, seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Reading::from).collect())
    }
}
