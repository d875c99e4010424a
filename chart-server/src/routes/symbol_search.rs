//! Symbol search endpoint

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::collections::BTreeMap;
use tracing::error;

use chart_vendor::SearchResponse;

use super::error_response;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/symbol-search", get(search))
}

/// Forward the query string, return the filtered results
async fn search(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    match state.symbol_search.search(params).await {
        Ok(results) => search_response(results),
        Err(e) => {
            error!("Symbol search failed: {}", e);
            error_response(e)
        }
    }
}

/// JSON is re-serialized; anything else goes out with the upstream content type
fn search_response(results: SearchResponse) -> Response {
    match results {
        SearchResponse::Json(value) => Json(value).into_response(),
        SearchResponse::Raw { body, content_type } => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_raw_body_keeps_content_type() {
        let response = search_response(SearchResponse::Raw {
            body: b"plain answer".to_vec(),
            content_type: "text/plain".to_string(),
        });

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"plain answer");
    }
}
