//! Hub connection health
//!
//! Each hub task writes its own `ConnectionMetrics`; HTTP handlers read them
//! without going through the hub's command channel.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use chart_core::{ConnectionState, MarketCategory};

/// A connected hub silent for longer than this is stale
pub const STALE_THRESHOLD_SECS: u64 = 60;

/// Health status for one hub
#[derive(Debug, Clone, Serialize)]
pub struct HubHealth {
    pub market: MarketCategory,
    pub state: ConnectionState,
    pub connected: bool,
    pub last_message_time: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub reconnect_count: u64,
    pub active_keys: usize,
    pub clients: usize,
    pub is_stale: bool,
}

/// Health of every hub
#[derive(Debug, Clone, Serialize)]
pub struct ServerHealth {
    pub hubs: Vec<HubHealth>,
    pub connected_clients: usize,
    pub healthy: bool,
}

impl ServerHealth {
    pub fn new(hubs: Vec<HubHealth>, connected_clients: usize) -> Self {
        let healthy = hubs.iter().all(|h| !h.is_stale);
        Self {
            hubs,
            connected_clients,
            healthy,
        }
    }
}

/// Health metrics for a single hub (atomic for thread-safe access)
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    state: RwLock<ConnectionState>,
    connected: AtomicBool,
    connected_at_epoch_ms: AtomicU64,
    last_message_epoch_ms: AtomicU64,
    message_count: AtomicU64,
    reconnect_count: AtomicU64,
    active_keys: AtomicUsize,
    clients: AtomicUsize,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if connected && !was {
            self.connected_at_epoch_ms.store(now_ms(), Ordering::SeqCst);
        }
    }

    pub fn record_message(&self) {
        self.last_message_epoch_ms.store(now_ms(), Ordering::SeqCst);
        self.message_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_reconnect(&self) {
        self.reconnect_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_routing(&self, active_keys: usize, clients: usize) {
        self.active_keys.store(active_keys, Ordering::SeqCst);
        self.clients.store(clients, Ordering::SeqCst);
    }

    pub fn get_health(&self, market: MarketCategory) -> HubHealth {
        self.health_at(market, now_ms())
    }

    fn health_at(&self, market: MarketCategory, now_ms: u64) -> HubHealth {
        let connected = self.connected.load(Ordering::SeqCst);
        let last_ms = self.last_message_epoch_ms.load(Ordering::SeqCst);

        let last_message_time = if last_ms > 0 {
            DateTime::from_timestamp(
                (last_ms / 1000) as i64,
                ((last_ms % 1000) * 1_000_000) as u32,
            )
        } else {
            None
        };

        // Silence is measured from the later of connect time and last message
        let since = last_ms.max(self.connected_at_epoch_ms.load(Ordering::SeqCst));
        let is_stale = connected && now_ms.saturating_sub(since) > STALE_THRESHOLD_SECS * 1000;

        HubHealth {
            market,
            state: *self.state.read(),
            connected,
            last_message_time,
            message_count: self.message_count.load(Ordering::SeqCst),
            reconnect_count: self.reconnect_count.load(Ordering::SeqCst),
            active_keys: self.active_keys.load(Ordering::SeqCst),
            clients: self.clients.load(Ordering::SeqCst),
            is_stale,
        }
    }
}
