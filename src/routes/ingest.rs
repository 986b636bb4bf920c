//! Ingestion and on-demand validation endpoints.

use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use tracing::info;

use super::AppState;
use crate::cleaning::{self, Validation};
use crate::{Confirmation, CoreError, IngestRequest};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/ingest", post(ingest))
        .route("/validate", post(validate))
}

/// `POST /ingest`: record a reading from a whitelisted sensor.
async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<Confirmation>, CoreError> {
    // ---
    info!(sensor_id = %request.sensor_id, "POST /ingest");
    let confirmation = state.ingestion.ingest(request).await?;
    Ok(Json(confirmation))
}

/// `POST /validate`: report what the cleaning rules think of a payload
/// without storing it.
async fn validate(Json(request): Json<IngestRequest>) -> Json<Validation> {
    // ---
    info!(sensor_id = %request.sensor_id, "POST /validate");
    let reading = request.into_reading(Utc::now());
    Json(cleaning::validate(&reading))
}
