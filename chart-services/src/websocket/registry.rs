//! Hub and client registries
//!
//! `HubRegistry` is built once at startup and handed to the front door.
//! `ClientRegistry` remembers which hub each browser connection is on so a
//! request for another category can release the old hub first.

use dashmap::DashMap;
use std::collections::HashMap;

use chart_core::{ChartError, ChartResult, MarketCategory};

use super::hub::{Hub, HubConfig, HubHandle};
use super::subscription::ClientId;
use crate::health::HubHealth;

/// One running hub per market category
#[derive(Debug, Clone)]
pub struct HubRegistry {
    hubs: HashMap<MarketCategory, HubHandle>,
}

impl HubRegistry {
    /// Spawn a hub for every category
    pub fn start(config: &HubConfig) -> Self {
        Self::from_handles(
            MarketCategory::ALL
                .iter()
                .map(|market| Hub::spawn(*market, config)),
        )
    }

    pub fn from_handles(handles: impl IntoIterator<Item = HubHandle>) -> Self {
        Self {
            hubs: handles.into_iter().map(|h| (h.market(), h)).collect(),
        }
    }

    pub fn get(&self, market: MarketCategory) -> ChartResult<&HubHandle> {
        self.hubs
            .get(&market)
            .ok_or_else(|| ChartError::not_found(format!("No hub for {}", market)))
    }

    /// Health of every hub, in category order
    pub fn health(&self) -> Vec<HubHealth> {
        MarketCategory::ALL
            .iter()
            .filter_map(|market| self.hubs.get(market))
            .map(HubHandle::health)
            .collect()
    }
}

/// client -> the hub it is attached to
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<ClientId, MarketCategory>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, client_id: ClientId) -> Option<MarketCategory> {
        self.clients.get(&client_id).map(|entry| *entry)
    }

    /// Attach a client to a hub, returning the previous one
    pub fn set(&self, client_id: ClientId, market: MarketCategory) -> Option<MarketCategory> {
        self.clients.insert(client_id, market)
    }

    pub fn remove(&self, client_id: ClientId) -> Option<MarketCategory> {
        self.clients.remove(&client_id).map(|(_, market)| market)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_registry() {
        let registry = ClientRegistry::new();
        assert_eq!(registry.set(ClientId(1), MarketCategory::Stocks), None);
        assert_eq!(
            registry.set(ClientId(1), MarketCategory::Crypto),
            Some(MarketCategory::Stocks)
        );
        assert_eq!(registry.current(ClientId(1)), Some(MarketCategory::Crypto));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.remove(ClientId(1)), Some(MarketCategory::Crypto));
        assert!(registry.is_empty());
        assert_eq!(registry.remove(ClientId(1)), None);
    }

    #[tokio::test]
    async fn test_hub_registry_has_every_category() {
        let config = HubConfig {
            vendor: chart_vendor::VendorConfig {
                api_key: None,
                ws_base_url: "ws://127.0.0.1:9".to_string(),
                rest_base_url: "http://127.0.0.1:9".to_string(),
            },
            ..HubConfig::default()
        };
        let registry = HubRegistry::start(&config);

        for market in MarketCategory::ALL {
            assert_eq!(registry.get(market).unwrap().market(), market);
        }
        assert_eq!(registry.health().len(), 4);
        assert!(registry.health().iter().all(|h| !h.connected));
    }
}
