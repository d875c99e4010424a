//! Market categories and bar cadences
//!
//! Each category maps to its own vendor socket, its own channel prefixes
//! and its own symbol prefix convention.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported market categories (one upstream connection each)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCategory {
    /// US equities
    #[default]
    Stocks,
    /// Crypto pairs, symbols prefixed `X:`
    Crypto,
    /// Currency pairs, symbols prefixed `C:`
    Forex,
    /// Indices, symbols prefixed `I:`
    Indices,
}

impl MarketCategory {
    /// Every category, in startup order
    pub const ALL: [MarketCategory; 4] = [
        MarketCategory::Stocks,
        MarketCategory::Crypto,
        MarketCategory::Forex,
        MarketCategory::Indices,
    ];

    /// Lowercase name, also the vendor socket path segment
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCategory::Stocks => "stocks",
            MarketCategory::Crypto => "crypto",
            MarketCategory::Forex => "forex",
            MarketCategory::Indices => "indices",
        }
    }

    /// Channel prefix for a cadence, including the trailing dot
    pub fn channel_prefix(&self, cadence: Cadence) -> &'static str {
        match (self, cadence) {
            (MarketCategory::Stocks | MarketCategory::Indices, Cadence::Second) => "A.",
            (MarketCategory::Stocks | MarketCategory::Indices, Cadence::Minute) => "AM.",
            (MarketCategory::Crypto, Cadence::Second) => "XAS.",
            (MarketCategory::Crypto, Cadence::Minute) => "XA.",
            (MarketCategory::Forex, Cadence::Second) => "CAS.",
            (MarketCategory::Forex, Cadence::Minute) => "CA.",
        }
    }

    /// Vendor symbol prefix, if this category uses one
    pub fn symbol_prefix(&self) -> Option<&'static str> {
        match self {
            MarketCategory::Stocks => None,
            MarketCategory::Crypto => Some("X:"),
            MarketCategory::Forex => Some("C:"),
            MarketCategory::Indices => Some("I:"),
        }
    }

    /// Whether an inbound `ev` value is one of this category's bar channels
    pub fn recognizes_event(&self, ev: &str) -> bool {
        [Cadence::Second, Cadence::Minute]
            .iter()
            .any(|cadence| self.channel_prefix(*cadence).trim_end_matches('.') == ev)
    }

    /// Parse a category, falling back to the default for unknown or missing values
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for MarketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MarketCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stocks" => Ok(MarketCategory::Stocks),
            "crypto" => Ok(MarketCategory::Crypto),
            "forex" => Ok(MarketCategory::Forex),
            "indices" => Ok(MarketCategory::Indices),
            _ => Err(format!("Unknown market: {}", s)),
        }
    }
}

/// Bar aggregation period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    /// Per-second bars
    #[default]
    Second,
    /// Per-minute bars
    Minute,
}

impl Cadence {
    /// Parse a cadence, falling back to the default for unknown or missing values
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl std::str::FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "second" => Ok(Cadence::Second),
            "minute" => Ok(Cadence::Minute),
            _ => Err(format!("Unknown interval: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_prefixes() {
        assert_eq!(MarketCategory::Stocks.channel_prefix(Cadence::Second), "A.");
        assert_eq!(MarketCategory::Indices.channel_prefix(Cadence::Minute), "AM.");
        assert_eq!(MarketCategory::Crypto.channel_prefix(Cadence::Second), "XAS.");
        assert_eq!(MarketCategory::Crypto.channel_prefix(Cadence::Minute), "XA.");
        assert_eq!(MarketCategory::Forex.channel_prefix(Cadence::Second), "CAS.");
        assert_eq!(MarketCategory::Forex.channel_prefix(Cadence::Minute), "CA.");
    }

    #[test]
    fn test_recognizes_event() {
        assert!(MarketCategory::Stocks.recognizes_event("A"));
        assert!(MarketCategory::Stocks.recognizes_event("AM"));
        assert!(!MarketCategory::Stocks.recognizes_event("XA"));
        assert!(!MarketCategory::Stocks.recognizes_event("status"));
        assert!(MarketCategory::Crypto.recognizes_event("XAS"));
        assert!(!MarketCategory::Crypto.recognizes_event("A"));
        assert!(MarketCategory::Forex.recognizes_event("CA"));
    }

    #[test]
    fn test_unknown_values_fall_back() {
        assert_eq!(MarketCategory::parse_or_default(Some("bonds")), MarketCategory::Stocks);
        assert_eq!(MarketCategory::parse_or_default(None), MarketCategory::Stocks);
        assert_eq!(MarketCategory::parse_or_default(Some("Crypto")), MarketCategory::Crypto);
        assert_eq!(Cadence::parse_or_default(Some("hour")), Cadence::Second);
        assert_eq!(Cadence::parse_or_default(Some("minute")), Cadence::Minute);
    }
}
