//! Symbol search pass-through
//!
//! Forwards the browser's search query to the symbol-search service, then
//! trims the answer down to the instrument types the chart can stream:
//! stocks, indices, forex, and crypto spot pairs.

use rand::Rng;
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{info, instrument, warn};

use chart_core::{ChartError, ChartResult};

/// Default symbol search endpoint
pub const SYMBOL_SEARCH_URL: &str = "https://symbol-search.tradingview.com/symbol_search/";

/// Attempts before giving up
const DEFAULT_ATTEMPTS: u32 = 3;

/// Fields the browser never needs
const STRIPPED_FIELDS: [&str; 4] = ["provider_id", "source_logoid", "source2", "source_id"];

/// Content type assumed when the search service sends none
const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Answer from the search service
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResponse {
    /// Filtered JSON payload
    Json(Value),
    /// Body that was not JSON, forwarded as received
    Raw { body: Vec<u8>, content_type: String },
}

/// Client for the symbol search service
#[derive(Clone, Debug)]
pub struct SymbolSearchClient {
    client: Client,
    url: String,
    attempts: u32,
}

impl SymbolSearchClient {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: url.into(),
            attempts: DEFAULT_ATTEMPTS,
        }
    }

    /// Create a client from `SYMBOL_SEARCH_URL`, falling back to the default
    pub fn from_env() -> Self {
        Self::new(std::env::var("SYMBOL_SEARCH_URL").unwrap_or_else(|_| SYMBOL_SEARCH_URL.to_string()))
    }

    /// Search, retrying with jitter, and filter the result
    #[instrument(skip(self))]
    pub async fn search(&self, params: BTreeMap<String, String>) -> ChartResult<SearchResponse> {
        let mut params = params;
        params.entry("lang".to_string()).or_insert_with(|| "en".to_string());
        params.entry("limit".to_string()).or_insert_with(|| "50".to_string());

        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            match self.client.get(&self.url).query(&params).send().await {
                Ok(response) if response.status().is_success() => {
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or(DEFAULT_CONTENT_TYPE)
                        .to_string();

                    match response.bytes().await {
                        Ok(body) => return Ok(decode_body(body.to_vec(), content_type)),
                        Err(e) => {
                            last_error = e.to_string();
                            warn!("Symbol search attempt {} body read failed: {}", attempt, last_error);
                        }
                    }
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    last_error = format!("{} {}", status, body.chars().take(200).collect::<String>());
                    warn!("Symbol search attempt {} non-2xx: {}", attempt, last_error);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!("Symbol search attempt {} failed: {}", attempt, last_error);
                }
            }

            if attempt < self.attempts {
                let jitter = Duration::from_millis(rand::rng().random_range(250..=800));
                info!("Retrying symbol search in {:?}", jitter);
                tokio::time::sleep(jitter).await;
            }
        }

        Err(ChartError::api(format!(
            "Symbol search failed after retries: {}",
            last_error
        )))
    }
}

/// Filter a JSON body, or keep a non-JSON one as it came
pub fn decode_body(body: Vec<u8>, content_type: String) -> SearchResponse {
    match serde_json::from_slice::<Value>(&body) {
        Ok(data) => SearchResponse::Json(filter_results(data)),
        Err(_) => {
            info!("Symbol search returned non-JSON; passing it through");
            SearchResponse::Raw { body, content_type }
        }
    }
}

/// Filter a search payload (bare list or `{symbols: [...]}`)
///
/// Unknown shapes are returned unchanged.
pub fn filter_results(data: Value) -> Value {
    match data {
        Value::Array(items) => {
            let original = items.len();
            let kept = filter_items(items);
            info!("Symbol search kept {}/{} (list)", kept.len(), original);
            Value::Array(kept)
        }
        Value::Object(mut object) => {
            if let Some(Value::Array(items)) = object.get_mut("symbols") {
                let original = items.len();
                let kept = filter_items(std::mem::take(items));
                info!("Symbol search kept {}/{} (symbols)", kept.len(), original);
                *items = kept;
            }
            Value::Object(object)
        }
        other => other,
    }
}

fn filter_items(items: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(object) if keep(&object) => Some(object),
            _ => None,
        })
        .filter(|object| {
            match object.get("symbol").and_then(Value::as_str) {
                Some(symbol) if !symbol.is_empty() => seen.insert(symbol.to_string()),
                _ => false,
            }
        })
        .map(|object| Value::Object(strip(object)))
        .collect()
}

fn has_crypto_typespec(item: &Map<String, Value>) -> bool {
    item.get("typespecs")
        .or_else(|| item.get("typeSpecs"))
        .and_then(Value::as_array)
        .map(|specs| {
            specs
                .iter()
                .filter_map(Value::as_str)
                .any(|s| s.eq_ignore_ascii_case("crypto"))
        })
        .unwrap_or(false)
}

fn keep(item: &Map<String, Value>) -> bool {
    let kind = item
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();
    let crypto = has_crypto_typespec(item);

    match kind.as_str() {
        "index" | "forex" | "stock" => !crypto,
        "spot" => crypto,
        _ => false,
    }
}

fn strip(mut item: Map<String, Value>) -> Map<String, Value> {
    for field in STRIPPED_FIELDS {
        item.remove(field);
    }

    let is_spot = item.get("type").and_then(Value::as_str) == Some("spot");
    if is_spot && has_crypto_typespec(&item) {
        item.insert("type".to_string(), Value::String("crypto".to_string()));
    }

    item
}
