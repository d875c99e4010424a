//! Vendor REST client for historical bars
//!
//! Backfill is a pass-through: one request per call, no retries here. The
//! browser retries on failure.

use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use chart_core::{AggregatesResponse, ChartError, ChartResult};

use crate::websocket::VendorConfig;

/// Parameters of one backfill request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatesQuery {
    /// Vendor ticker, e.g. `AAPL` or `X:BTCUSD`
    pub ticker: String,
    /// Range start, epoch seconds
    pub from_secs: i64,
    /// Range end, epoch seconds
    pub to_secs: i64,
    /// second | minute | hour | day ...
    pub timespan: String,
    pub multiplier: u32,
}

impl AggregatesQuery {
    pub fn new(ticker: impl Into<String>, from_secs: i64, to_secs: i64) -> Self {
        Self {
            ticker: ticker.into(),
            from_secs,
            to_secs,
            timespan: "minute".to_string(),
            multiplier: 1,
        }
    }

    pub fn with_timespan(mut self, timespan: Option<String>, multiplier: Option<u32>) -> Self {
        if let Some(timespan) = timespan.filter(|t| !t.is_empty()) {
            self.timespan = timespan;
        }
        if let Some(multiplier) = multiplier.filter(|m| *m > 0) {
            self.multiplier = multiplier;
        }
        self
    }
}

/// REST client for the vendor aggregates endpoint
#[derive(Clone)]
pub struct AggregatesClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl AggregatesClient {
    /// Create a client from vendor settings
    pub fn new(config: &VendorConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.rest_base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the vendor URL for a query (without the API key)
    pub fn aggregates_url(&self, query: &AggregatesQuery) -> ChartResult<Url> {
        if query.ticker.trim().is_empty() {
            return Err(ChartError::parse("Ticker is required"));
        }
        if query.to_secs < query.from_secs {
            return Err(ChartError::parse(format!(
                "Invalid range: {} is before {}",
                query.to_secs, query.from_secs
            )));
        }

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ChartError::config(format!("Invalid REST base URL: {}", e)))?;

        let multiplier = query.multiplier.to_string();
        let from_ms = to_millis(query.from_secs)?.to_string();
        let to_ms = to_millis(query.to_secs)?.to_string();

        url.path_segments_mut()
            .map_err(|_| ChartError::config("REST base URL cannot be a base"))?
            .pop_if_empty()
            .extend([
                "v2",
                "aggs",
                "ticker",
                query.ticker.trim(),
                "range",
                multiplier.as_str(),
                query.timespan.as_str(),
                from_ms.as_str(),
                to_ms.as_str(),
            ]);

        url.query_pairs_mut()
            .append_pair("adjusted", "true")
            .append_pair("sort", "asc")
            .append_pair("limit", "50000");

        Ok(url)
    }

    /// Fetch bars for a range
    #[instrument(skip(self))]
    pub async fn get_aggregates(&self, query: &AggregatesQuery) -> ChartResult<AggregatesResponse> {
        let url = self.aggregates_url(query)?;
        debug!("Fetching aggregates from: {}", url);

        let mut request = self.client.get(url);
        if let Some(ref key) = self.api_key {
            request = request.query(&[("apiKey", key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChartError::network(format!("Failed to fetch aggregates: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChartError::api(format!(
                "Aggregates request failed with status {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<AggregatesResponse>()
            .await
            .map_err(|e| ChartError::vendor("aggregates", format!("Unreadable response: {}", e)))
    }
}

/// Epoch seconds to epoch milliseconds, rejecting values that overflow
fn to_millis(secs: i64) -> ChartResult<i64> {
    secs.checked_mul(1000)
        .ok_or_else(|| ChartError::parse(format!("Invalid range: {} is out of bounds", secs)))
}

impl std::fmt::Debug for AggregatesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatesClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AggregatesClient {
        AggregatesClient::new(&VendorConfig {
            api_key: Some("secret".to_string()),
            ws_base_url: "wss://socket.example.com".to_string(),
            rest_base_url: "https://api.example.com".to_string(),
        })
    }

    #[test]
    fn test_aggregates_url() {
        let query = AggregatesQuery::new("AAPL", 1_700_000_000, 1_700_003_600);
        let url = client().aggregates_url(&query).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v2/aggs/ticker/AAPL/range/1/minute/1700000000000/1700003600000?adjusted=true&sort=asc&limit=50000"
        );
    }

    #[test]
    fn test_aggregates_url_escapes_ticker() {
        let query = AggregatesQuery::new("C:EUR/USD", 0, 60)
            .with_timespan(Some("second".to_string()), Some(5));
        let url = client().aggregates_url(&query).unwrap();
        assert!(url.path().contains("/ticker/C:EUR%2FUSD/range/5/second/0/60000"));
    }

    #[test]
    fn test_timespan_defaults() {
        let query = AggregatesQuery::new("AAPL", 0, 1).with_timespan(Some(String::new()), Some(0));
        assert_eq!(query.timespan, "minute");
        assert_eq!(query.multiplier, 1);
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let c = client();
        assert!(c.aggregates_url(&AggregatesQuery::new("AAPL", 100, 50)).is_err());
        assert!(c.aggregates_url(&AggregatesQuery::new(" ", 0, 50)).is_err());

        let overflow = AggregatesQuery::new("AAPL", 9_223_372_036_854_775, 9_223_372_036_854_776);
        assert!(matches!(
            c.aggregates_url(&overflow),
            Err(ChartError::Parse(message)) if message.contains("Invalid range")
        ));
        assert!(c
            .aggregates_url(&AggregatesQuery::new("AAPL", i64::MIN, 0))
            .is_err());
    }
}
