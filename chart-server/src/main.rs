//! Market-data chart server
//!
//! Fans vendor bar streams out to browser WebSockets and proxies chart
//! backfill and symbol search requests.

mod routes;

use axum::http::{header, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chart_services::{HubConfig, HubRegistry, WebSocketState};
use chart_vendor::{AggregatesClient, SymbolSearchClient};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ws_state: Arc<WebSocketState>,
    pub aggregates: Arc<AggregatesClient>,
    pub symbol_search: Arc<SymbolSearchClient>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chart_server=debug")),
        )
        .init();

    info!("Starting market-data chart server");

    let hub_config = HubConfig::default();
    if hub_config.vendor.api_key.is_none() {
        warn!("POLYGON_API_KEY is not set - vendor auth and backfill will fail");
    }
    info!("Vendor config: {:?}", hub_config.vendor);

    // One hub per market category, started before we accept connections
    let hubs = HubRegistry::start(&hub_config);

    let state = AppState {
        ws_state: Arc::new(WebSocketState::new(hubs)),
        aggregates: Arc::new(AggregatesClient::new(&hub_config.vendor)),
        symbol_search: Arc::new(SymbolSearchClient::from_env()),
    };

    // Configure CORS for frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let port = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
