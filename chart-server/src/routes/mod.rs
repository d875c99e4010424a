//! Route definitions

mod admin;
mod aggregates;
mod health;
mod symbol_search;
pub mod ws;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json, Router};
use serde::Serialize;

use chart_core::ChartError;

use crate::AppState;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// HTTP status for a failed request
pub fn status_for(err: &ChartError) -> StatusCode {
    match err {
        ChartError::Parse(_) => StatusCode::BAD_REQUEST,
        ChartError::NotFound(_) => StatusCode::NOT_FOUND,
        ChartError::Api(_) | ChartError::Network(_) | ChartError::Vendor { .. } => {
            StatusCode::BAD_GATEWAY
        }
        ChartError::Config(_) | ChartError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: ChartError) -> Response {
    (
        status_for(&err),
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Create all routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(aggregates::routes())
        .merge(symbol_search::routes())
        .merge(admin::routes())
        .merge(health::routes())
        .merge(ws::routes())
        .with_state(state)
}
