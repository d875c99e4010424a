//! Operator endpoints

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use chart_core::{ChartError, MarketCategory};

use super::error_response;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ForceCloseParams {
    /// Let the reconnect path run afterwards (default true)
    pub reconnect: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ForceCloseResponse {
    pub market: MarketCategory,
    pub reconnect: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/admin/force-close/{market}", post(force_close))
}

/// Close one category's vendor socket
async fn force_close(
    State(state): State<AppState>,
    Path(market): Path<String>,
    Query(params): Query<ForceCloseParams>,
) -> Response {
    let market: MarketCategory = match market.parse() {
        Ok(market) => market,
        Err(e) => return error_response(ChartError::not_found(e)),
    };
    let reconnect = params.reconnect.unwrap_or(true);
    warn!("Admin force close of {} (reconnect: {})", market, reconnect);

    let result = match state.ws_state.hubs.get(market) {
        Ok(hub) => hub.force_close(reconnect).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Json(ForceCloseResponse { market, reconnect }).into_response(),
        Err(e) => error_response(e),
    }
}
