//! Hub layer for the market-data chart server
//!
//! Multiplexes browser WebSocket clients over one vendor connection per
//! market category and tracks the health of each hub.

pub mod health;
pub mod websocket;

pub use health::{ConnectionMetrics, HubHealth, ServerHealth};
pub use websocket::{
    ClientConnection, ClientId, ClientRegistry, Hub, HubConfig, HubHandle, HubRegistry,
    SubscriptionRouter, UpstreamControl, WebSocketState,
};
