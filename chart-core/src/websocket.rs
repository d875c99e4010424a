//! WebSocket message types shared by the front door and the hubs
//!
//! Browsers send one JSON object per subscription change. The server answers
//! with raw vendor event arrays, so there is no server-side message enum.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Cadence, ChartError, ChartResult, MarketCategory, SubscriptionKey};

// ============================================================================
// Client -> Server Messages
// ============================================================================

/// Subscription request sent by a browser
///
/// `market` and `interval` are kept as raw strings so unknown values fall
/// back to the defaults instead of failing the whole message. Values that
/// are not strings at all are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Symbol as typed by the user, e.g. `AAPL`, `BTC-USD`, `EUR-USD`
    pub ticker: String,
    /// stocks | crypto | forex | indices (default stocks)
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub market: Option<String>,
    /// second | minute (default second)
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

impl SubscriptionRequest {
    /// Parse a browser text frame
    pub fn parse(text: &str) -> ChartResult<Self> {
        let request: Self = serde_json::from_str(text)
            .map_err(|e| ChartError::parse(format!("Invalid subscription message: {}", e)))?;

        if request.ticker.trim().is_empty() {
            return Err(ChartError::parse("Subscription message has an empty ticker"));
        }

        Ok(request)
    }

    /// Market category, defaulting to stocks
    pub fn market(&self) -> MarketCategory {
        MarketCategory::parse_or_default(self.market.as_deref())
    }

    /// Cadence, defaulting to per-second bars
    pub fn cadence(&self) -> Cadence {
        Cadence::parse_or_default(self.interval.as_deref())
    }

    /// Routing key this request subscribes to
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.market(), self.ticker.trim(), self.cadence())
    }
}

// ============================================================================
// Upstream connection state
// ============================================================================

/// State of one upstream vendor connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket, may have a reconnect scheduled
    #[default]
    Disconnected,
    /// Dialing the vendor
    Connecting,
    /// Socket open, auth sent, waiting for the vendor verdict
    AuthPending,
    /// Subscriptions flow
    Authenticated,
}

impl ConnectionState {
    /// True while a socket is being dialed or is open
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}
