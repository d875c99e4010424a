//! Chart backfill endpoint

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info};

use chart_vendor::AggregatesQuery;

use super::error_response;
use crate::AppState;

/// Optional bar size, defaults to 1 minute
#[derive(Debug, Deserialize)]
pub struct AggregatesParams {
    pub timespan: Option<String>,
    pub multiplier: Option<u32>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/aggregates/{ticker}/{from}/{to}", get(get_aggregates))
}

/// Fetch historical bars for a ticker between two epoch-second bounds
async fn get_aggregates(
    State(state): State<AppState>,
    Path((ticker, from, to)): Path<(String, i64, i64)>,
    Query(params): Query<AggregatesParams>,
) -> Response {
    let query =
        AggregatesQuery::new(ticker, from, to).with_timespan(params.timespan, params.multiplier);
    info!("Backfill {:?}", query);

    match state.aggregates.get_aggregates(&query).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            error!("Failed to fetch aggregates for {}: {}", query.ticker, e);
            error_response(e)
        }
    }
}
