//! Subscription router for one hub
//!
//! Tracks which browser clients want which upstream key and keeps the vendor
//! subscribed to exactly the keys that have at least one client. Owned by a
//! single hub task, so the tables are plain maps.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use chart_core::SubscriptionKey;
use chart_vendor::{UpstreamConnection, VendorAction};

/// Unique identifier for a WebSocket client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Handle to one browser connection: its id plus the outbound queue
///
/// Equality and hashing use the id only.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    pub id: ClientId,
    sender: mpsc::Sender<String>,
}

impl ClientConnection {
    pub fn new(id: ClientId, sender: mpsc::Sender<String>) -> Self {
        Self { id, sender }
    }
}

impl PartialEq for ClientConnection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientConnection {}

impl Hash for ClientConnection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// What the router needs from the upstream connection
pub trait UpstreamControl {
    fn subscribe(&mut self, key: &SubscriptionKey);
    fn unsubscribe(&mut self, key: &SubscriptionKey);
    fn ensure_connected(&mut self);
    fn idle_close(&mut self);
}

impl UpstreamControl for UpstreamConnection {
    fn subscribe(&mut self, key: &SubscriptionKey) {
        self.send_or_queue(VendorAction::Subscribe(key.clone()));
    }

    fn unsubscribe(&mut self, key: &SubscriptionKey) {
        self.send_or_queue(VendorAction::Unsubscribe(key.clone()));
    }

    fn ensure_connected(&mut self) {
        self.connect();
    }

    fn idle_close(&mut self) {
        UpstreamConnection::idle_close(self);
    }
}

/// key -> clients and client -> keys
#[derive(Debug, Default)]
pub struct SubscriptionRouter {
    /// Only keys with at least one client are present
    subscriptions: HashMap<SubscriptionKey, HashSet<ClientConnection>>,
    client_subscriptions: HashMap<ClientId, HashSet<SubscriptionKey>>,
}

impl SubscriptionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a client onto `key`, leaving every other key it held
    ///
    /// Old keys are released before the new one is added, so a sole
    /// subscriber switching from A to B unsubscribes A before subscribing B.
    /// The upstream is not idle-closed in between since a key is about to be
    /// added back.
    pub fn change_client_subscription<U: UpstreamControl>(
        &mut self,
        client: ClientConnection,
        key: SubscriptionKey,
        upstream: &mut U,
    ) {
        let previous: Vec<SubscriptionKey> = self
            .client_subscriptions
            .get(&client.id)
            .map(|keys| keys.iter().filter(|k| **k != key).cloned().collect())
            .unwrap_or_default();

        for old in previous {
            self.release(client.id, &old, upstream);
        }

        let clients = self.subscriptions.entry(key.clone()).or_default();
        let first = clients.is_empty();
        let client_id = client.id;
        clients.replace(client);

        if first {
            info!("First subscriber for {}, subscribing upstream", key);
            upstream.subscribe(&key);
        }

        let keys = self.client_subscriptions.entry(client_id).or_default();
        keys.clear();
        keys.insert(key.clone());
        debug!("Client {} subscribed to {}", client_id, key);

        upstream.ensure_connected();
    }

    /// Remove a client from one key, idle-closing upstream if nothing is left
    pub fn remove_client_from_key<U: UpstreamControl>(
        &mut self,
        client_id: ClientId,
        key: &SubscriptionKey,
        upstream: &mut U,
    ) {
        self.release(client_id, key, upstream);

        if self.subscriptions.is_empty() {
            upstream.idle_close();
        }
    }

    /// Remove a client from every key it holds
    pub fn drop_client<U: UpstreamControl>(&mut self, client_id: ClientId, upstream: &mut U) {
        let keys: Vec<SubscriptionKey> = self
            .client_subscriptions
            .get(&client_id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();

        for key in keys {
            self.remove_client_from_key(client_id, &key, upstream);
        }

        self.client_subscriptions.remove(&client_id);
        debug!("Client {} removed from router", client_id);
    }

    fn release<U: UpstreamControl>(
        &mut self,
        client_id: ClientId,
        key: &SubscriptionKey,
        upstream: &mut U,
    ) {
        if let Some(keys) = self.client_subscriptions.get_mut(&client_id) {
            keys.remove(key);
        }

        let emptied = match self.subscriptions.get_mut(key) {
            Some(clients) => {
                clients.retain(|c| c.id != client_id);
                clients.is_empty()
            }
            None => false,
        };

        if emptied {
            self.subscriptions.remove(key);
            info!("Last subscriber left {}, unsubscribing upstream", key);
            upstream.unsubscribe(key);
        }
    }

    /// Deliver bar events to the clients subscribed to their keys
    ///
    /// Events of one upstream message are grouped per client and sent as one
    /// JSON array, preserving their received order. Returns the number of
    /// client messages queued.
    pub fn dispatch(&self, events: &[(SubscriptionKey, Value)]) -> usize {
        let mut per_client: IndexMap<ClientId, (&ClientConnection, Vec<&Value>)> = IndexMap::new();

        for (key, event) in events {
            let Some(clients) = self.subscriptions.get(key) else {
                continue;
            };
            for client in clients {
                per_client
                    .entry(client.id)
                    .or_insert_with(|| (client, Vec::new()))
                    .1
                    .push(event);
            }
        }

        let mut delivered = 0;
        for (client_id, (client, batch)) in per_client {
            let payload = match serde_json::to_string(&batch) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to serialize events for {}: {}", client_id, e);
                    continue;
                }
            };

            match client.sender.try_send(payload) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Client {} outbound queue full, dropping update", client_id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Client {} already gone", client_id);
                }
            }
        }

        delivered
    }

    /// Keys with at least one subscriber
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<SubscriptionKey> = self.subscriptions.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn subscriber_count(&self, key: &SubscriptionKey) -> usize {
        self.subscriptions.get(key).map(HashSet::len).unwrap_or(0)
    }

    pub fn client_keys(&self, client_id: ClientId) -> Vec<SubscriptionKey> {
        self.client_subscriptions
            .get(&client_id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Number of active keys
    pub fn total_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    /// Number of clients holding a key
    pub fn total_clients(&self) -> usize {
        self.client_subscriptions
            .values()
            .filter(|keys| !keys.is_empty())
            .count()
    }
}
