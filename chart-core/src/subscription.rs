//! Subscription keys
//!
//! A key names one upstream channel: `<cadencePrefix><prefixedSymbol>`,
//! e.g. `AM.AAPL` or `XAS.X:BTC-USD`. The same key is derived for a browser
//! request and for the vendor events that answer it, which is what lets the
//! router match the two.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Cadence, MarketCategory};

/// Unique key for one upstream channel within a market category
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    /// Build the key a browser subscription maps to
    pub fn new(market: MarketCategory, symbol: &str, cadence: Cadence) -> Self {
        Self(format!(
            "{}{}",
            market.channel_prefix(cadence),
            prefixed_symbol(market, symbol)
        ))
    }

    /// Build the routing key of an inbound vendor event (`ev` plus `sym`/`pair`)
    pub fn from_event(market: MarketCategory, ev: &str, symbol: &str) -> Self {
        Self(format!("{}.{}", ev, prefixed_symbol(market, symbol)))
    }

    /// The key as sent in vendor subscribe/unsubscribe params
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Apply the category's symbol convention
///
/// Forex `EUR-USD` becomes `EUR/USD`; the category prefix is added unless the
/// symbol already carries one (contains a colon).
pub fn prefixed_symbol(market: MarketCategory, symbol: &str) -> String {
    let symbol = match market {
        MarketCategory::Forex => symbol.replace('-', "/"),
        _ => symbol.to_string(),
    };

    match market.symbol_prefix() {
        Some(prefix) if !symbol.contains(':') => format!("{}{}", prefix, symbol),
        _ => symbol,
    }
}
