//! Core types for the market-data chart hub
//!
//! This crate defines the shared data structures used across the hub,
//! including market categories, subscription keys, browser wire messages
//! and price bars.

pub mod bar;
pub mod error;
pub mod market;
pub mod subscription;
pub mod websocket;

pub use bar::{AggregatesResponse, Bar};
pub use error::{ChartError, ChartResult};
pub use market::{Cadence, MarketCategory};
pub use subscription::{prefixed_symbol, SubscriptionKey};
pub use websocket::{ConnectionState, SubscriptionRequest};
