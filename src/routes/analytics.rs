//! Read-only analytics endpoints: status, map, history and distribution.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::info;

use super::AppState;
use crate::{AggregationResult, CoreError, MapMarker, StatusSnapshot, TimeSeries};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/status", get(status))
        .route("/map", get(map))
        .route("/history/{sensor_id}", get(history))
        .route("/distribution/{year}/{month}", get(distribution))
}

async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    // ---
    let total_readings = state.ingestion.total_readings();
    Json(state.analytics.status(total_readings))
}

async fn map(State(state): State<AppState>) -> Json<Vec<MapMarker>> {
    // ---
    let markers = state.analytics.map_markers();
    info!("GET /map - {} markers", markers.len());
    Json(markers)
}

async fn history(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
) -> Result<Json<TimeSeries>, CoreError> {
    // ---
    let series = state.analytics.timeseries(&sensor_id)?;
    info!("GET /history/{} - {} points", sensor_id, series.points.len());
    Ok(Json(series))
}

async fn distribution(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
) -> Result<Json<AggregationResult>, CoreError> {
    // ---
    let result = state.analytics.distribution(year, month)?;
    info!("GET /distribution/{}/{} - {} provinces", year, month, result.provinces.len());
    Ok(Json(result))
}
