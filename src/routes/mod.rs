//! HTTP gateway: merges one sub-router per endpoint group and translates
//! core failures into status codes.

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json, Router};
use serde::Serialize;
use tracing::{debug, error};

use crate::{AggregationEngine, CoreError, IngestionService};

mod analytics;
mod health;
mod ingest;

// ---

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionService>,
    pub analytics: Arc<AggregationEngine>,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(ingest::router())
        .merge(analytics::router())
        .merge(health::router())
        .with_state(state)
}

/// JSON body for failed requests.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    details: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        // ---
        let (status, error) = match &self {
            CoreError::UnauthorizedSensor(_) => (StatusCode::FORBIDDEN, "unauthorized_sensor"),
            CoreError::InvalidPeriod { .. } => (StatusCode::BAD_REQUEST, "invalid_period"),
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            CoreError::NoData { .. } => (StatusCode::NOT_FOUND, "no_data"),
            CoreError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_failure"),
            CoreError::InvalidGeometry { .. } | CoreError::EmptyRegistry => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Request rejected: {}", self);
        }

        let body = ErrorResponse {
            error,
            details: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
