//! Database schema management for `airsense-service`.
//!
//! Ensures the ingestion log table and its index exist before serving
//! requests. Applied once on startup from `main.rs`.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the ingestion log schema (idempotent).
///
/// `sensor_readings` is append-only: one row per ingestion event, values kept
/// exactly as submitted. `seq` records append order and breaks ties between
/// equal `recorded_at` values on replay. Safe to call on every startup.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            id           UUID        PRIMARY KEY,
            sensor_id    TEXT        NOT NULL,
            readings     JSONB       NOT NULL,
            recorded_at  TIMESTAMPTZ NOT NULL,
            seq          BIGSERIAL   NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Tables created before `seq` existed get it backfilled in storage order.
    sqlx::query(
        r#"
        ALTER TABLE sensor_readings
            ADD COLUMN IF NOT EXISTS seq BIGSERIAL NOT NULL;
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_readings_sensor_id
            ON sensor_readings (sensor_id, recorded_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
