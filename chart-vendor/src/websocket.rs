//! Vendor WebSocket dialing and configuration
//!
//! One socket per market category, at `<base>/<category>`. The socket is
//! driven by the hub task; this module only knows how to open it and how to
//! turn raw tungstenite messages into something the hub can act on.

use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use chart_core::{ChartError, ChartResult, MarketCategory};

/// Vendor WebSocket base URL
pub const POLYGON_WS_URL: &str = "wss://socket.polygon.io";

/// Vendor REST base URL
pub const POLYGON_REST_URL: &str = "https://api.polygon.io";

/// Open vendor socket
pub type VendorStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Vendor connection settings
#[derive(Clone)]
pub struct VendorConfig {
    pub api_key: Option<String>,
    pub ws_base_url: String,
    pub rest_base_url: String,
}

impl std::fmt::Debug for VendorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("ws_base_url", &self.ws_base_url)
            .field("rest_base_url", &self.rest_base_url)
            .finish()
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("POLYGON_API_KEY").ok(),
            ws_base_url: std::env::var("POLYGON_WS_URL")
                .unwrap_or_else(|_| POLYGON_WS_URL.to_string()),
            rest_base_url: std::env::var("POLYGON_REST_URL")
                .unwrap_or_else(|_| POLYGON_REST_URL.to_string()),
        }
    }
}

impl VendorConfig {
    /// Socket URL for one category
    pub fn socket_url(&self, market: MarketCategory) -> String {
        format!(
            "{}/{}",
            self.ws_base_url.trim_end_matches('/'),
            market.as_str()
        )
    }
}

/// Dial the vendor
pub async fn connect_vendor(url: &str) -> ChartResult<VendorStream> {
    info!("[Vendor WS] Connecting to {}", url);
    let (stream, response) = connect_async(url)
        .await
        .map_err(|e| ChartError::network(format!("Failed to connect to {}: {}", url, e)))?;
    debug!("[Vendor WS] Handshake status {}", response.status());
    Ok(stream)
}

/// What the hub should do with one inbound socket message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// JSON text to parse
    Text(String),
    /// Ping payload to answer
    Ping(Vec<u8>),
    /// Socket is done
    Closed,
    /// Nothing to do
    Ignore,
}

impl Inbound {
    /// Classify a read result (`None` means the stream ended)
    pub fn classify(msg: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>) -> Self {
        match msg {
            Some(Ok(Message::Text(text))) => Inbound::Text(text.to_string()),
            Some(Ok(Message::Ping(data))) => Inbound::Ping(data.to_vec()),
            Some(Ok(Message::Close(frame))) => {
                info!("[Vendor WS] Closed by server: {:?}", frame);
                Inbound::Closed
            }
            Some(Ok(_)) => Inbound::Ignore,
            Some(Err(e)) => {
                info!("[Vendor WS] Socket error: {}", e);
                Inbound::Closed
            }
            None => Inbound::Closed,
        }
    }
}
