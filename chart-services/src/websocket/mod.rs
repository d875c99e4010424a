//! WebSocket fan-out
//!
//! Browsers connect through `WebSocketState`; each market category has one
//! hub task that owns the vendor socket and the routing tables for it.

mod handler;
mod hub;
mod registry;
mod subscription;

pub use handler::WebSocketState;
pub use hub::{Hub, HubCommand, HubConfig, HubHandle};
pub use registry::{ClientRegistry, HubRegistry};
pub use subscription::{ClientConnection, ClientId, SubscriptionRouter, UpstreamControl};
