//! Price bars returned by the backfill endpoint

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar start, epoch milliseconds
    pub t: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub o: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub h: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub l: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub c: Decimal,
    /// Volume (absent for some forex/index bars)
    #[serde(default, with = "rust_decimal::serde::float")]
    pub v: Decimal,
}

/// Backfill response, `{ results: [...] }`
///
/// The vendor omits `results` entirely when the range holds no bars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatesResponse {
    #[serde(default)]
    pub results: Vec<Bar>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_vendor_aggregates() {
        let json = r#"{
            "ticker": "AAPL",
            "status": "OK",
            "resultsCount": 2,
            "results": [
                {"t": 1700000000000, "o": 189.5, "h": 190.25, "l": 189.0, "c": 190, "v": 1200, "vw": 189.9, "n": 14},
                {"t": 1700000060000, "o": 190, "h": 190.5, "l": 189.75, "c": 190.1}
            ]
        }"#;

        let response: AggregatesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].o, dec!(189.5));
        assert_eq!(response.results[0].v, dec!(1200));
        assert_eq!(response.results[1].v, Decimal::ZERO);
    }

    #[test]
    fn test_missing_results_is_empty() {
        let response: AggregatesResponse =
            serde_json::from_str(r#"{"status":"OK","resultsCount":0}"#).unwrap();
        assert!(response.results.is_empty());
    }

    #[test]
    fn test_serializes_numbers() {
        let bar = Bar {
            t: 1000,
            o: dec!(1),
            h: dec!(2),
            l: dec!(1),
            c: dec!(1.5),
            v: dec!(10),
        };
        let json = serde_json::to_value(&bar).unwrap();
        assert_eq!(json["c"], serde_json::json!(1.5));
    }
}
