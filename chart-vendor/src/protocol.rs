//! Vendor WebSocket protocol
//!
//! Outbound: `{"action": "auth"|"subscribe"|"unsubscribe", "params": "..."}`.
//! Inbound: every text frame is a JSON array of events. `ev: "status"` events
//! carry connection/auth verdicts; bar events carry `ev` plus `sym` or `pair`.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use chart_core::{MarketCategory, SubscriptionKey};

// ============================================================================
// Outbound
// ============================================================================

/// Control message sent to the vendor
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "params", rename_all = "lowercase")]
pub enum VendorAction {
    Auth(String),
    Subscribe(SubscriptionKey),
    Unsubscribe(SubscriptionKey),
}

impl VendorAction {
    /// Key this action refers to, if any
    pub fn key(&self) -> Option<&SubscriptionKey> {
        match self {
            VendorAction::Auth(_) => None,
            VendorAction::Subscribe(key) | VendorAction::Unsubscribe(key) => Some(key),
        }
    }

    /// Serialize for the socket
    pub fn to_json(&self) -> String {
        // Enum of strings, cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl std::fmt::Debug for VendorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VendorAction::Auth(_) => f.write_str("Auth([REDACTED])"),
            VendorAction::Subscribe(key) => write!(f, "Subscribe({})", key),
            VendorAction::Unsubscribe(key) => write!(f, "Unsubscribe({})", key),
        }
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Vendor status verdicts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorStatus {
    /// Socket accepted, auth expected next
    Connected,
    AuthSuccess,
    AuthFailed,
    /// Subscription acknowledgement
    Success,
    Other(String),
}

impl From<&str> for VendorStatus {
    fn from(status: &str) -> Self {
        match status {
            "connected" => VendorStatus::Connected,
            "auth_success" => VendorStatus::AuthSuccess,
            "auth_failed" => VendorStatus::AuthFailed,
            "success" => VendorStatus::Success,
            other => VendorStatus::Other(other.to_string()),
        }
    }
}

/// One parsed inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum VendorFrame {
    Status {
        status: VendorStatus,
        message: String,
    },
    /// Bar event for this category, kept verbatim for forwarding
    Bar {
        key: SubscriptionKey,
        event: Value,
    },
}

/// Parse an inbound text frame for a category
///
/// Malformed or non-array payloads yield no frames. Events of a type this
/// category does not stream are ignored.
pub fn parse_message(market: MarketCategory, text: &str) -> Vec<VendorFrame> {
    let events = match serde_json::from_str::<Vec<Value>>(text) {
        Ok(events) => events,
        Err(e) => {
            debug!("[{} WS] Dropping malformed payload: {}", market, e);
            return Vec::new();
        }
    };

    let mut frames = Vec::with_capacity(events.len());
    for event in events {
        let ev = match event.get("ev").and_then(Value::as_str) {
            Some(ev) => ev,
            None => continue,
        };

        if ev == "status" {
            let status = event.get("status").and_then(Value::as_str).unwrap_or("");
            let message = event
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            frames.push(VendorFrame::Status {
                status: VendorStatus::from(status),
                message,
            });
            continue;
        }

        if !market.recognizes_event(ev) {
            debug!("[{} WS] Ignoring event type {}", market, ev);
            continue;
        }

        let symbol = event
            .get("sym")
            .or_else(|| event.get("pair"))
            .and_then(Value::as_str);

        if let Some(symbol) = symbol {
            let key = SubscriptionKey::from_event(market, ev, symbol);
            frames.push(VendorFrame::Bar { key, event });
        }
    }

    frames
}
