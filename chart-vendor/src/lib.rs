//! Market-data vendor integration
//!
//! Everything that talks to the vendor lives here:
//! - `upstream`: per-category connection state machine (auth, queueing, backoff)
//! - `protocol`: vendor control messages and inbound event parsing
//! - `websocket`: socket dialing and configuration
//! - `client`: REST aggregates for chart backfill
//! - `symbol_search`: filtered symbol search pass-through
//!
//! Set `POLYGON_API_KEY` for both the socket auth message and REST requests.

pub mod client;
pub mod protocol;
pub mod symbol_search;
pub mod upstream;
pub mod websocket;

pub use client::{AggregatesClient, AggregatesQuery};
pub use protocol::{parse_message, VendorAction, VendorFrame, VendorStatus};
pub use symbol_search::{decode_body, filter_results, SearchResponse, SymbolSearchClient};
pub use upstream::{Backoff, UpstreamConnection, UpstreamEffect, INITIAL_BACKOFF, MAX_BACKOFF};
pub use websocket::{connect_vendor, Inbound, VendorConfig, VendorStream};
