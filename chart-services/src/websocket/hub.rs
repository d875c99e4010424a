//! Hub task: one per market category
//!
//! A hub owns one `UpstreamConnection` and one `SubscriptionRouter` and runs
//! every transition on a single task. Callers talk to it through a
//! `HubHandle`; the vendor socket, the pending dial and the reconnect timer
//! are all polled from the same `select!` loop.

use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use chart_core::{ChartError, ChartResult, MarketCategory, SubscriptionKey};
use chart_vendor::{
    connect_vendor, parse_message, Backoff, Inbound, UpstreamConnection, UpstreamEffect,
    VendorConfig, VendorFrame, VendorStatus, VendorStream, INITIAL_BACKOFF, MAX_BACKOFF,
};

use super::subscription::{ClientConnection, ClientId, SubscriptionRouter};
use crate::health::{ConnectionMetrics, HubHealth};

type DialFuture = Pin<Box<dyn Future<Output = ChartResult<VendorStream>> + Send>>;

/// Settings shared by every hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub vendor: VendorConfig,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Command channel capacity per hub
    pub command_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            vendor: VendorConfig::default(),
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
            command_buffer: 256,
        }
    }
}

/// Requests handled by the hub task
#[derive(Debug)]
pub enum HubCommand {
    ChangeSubscription {
        client: ClientConnection,
        key: SubscriptionKey,
    },
    DropClient(ClientId),
    /// Operator-initiated close
    ForceClose { reconnect: bool },
}

/// Caller side of a running hub
#[derive(Debug, Clone)]
pub struct HubHandle {
    market: MarketCategory,
    commands: mpsc::Sender<HubCommand>,
    metrics: Arc<ConnectionMetrics>,
}

impl HubHandle {
    pub fn market(&self) -> MarketCategory {
        self.market
    }

    /// Subscribe a client to `key`, replacing whatever it held on this hub
    pub async fn change_client_subscription(
        &self,
        client: ClientConnection,
        key: SubscriptionKey,
    ) -> ChartResult<()> {
        self.send(HubCommand::ChangeSubscription { client, key }).await
    }

    /// Release everything a client held on this hub
    pub async fn drop_client(&self, client_id: ClientId) -> ChartResult<()> {
        self.send(HubCommand::DropClient(client_id)).await
    }

    pub async fn force_close(&self, reconnect: bool) -> ChartResult<()> {
        self.send(HubCommand::ForceClose { reconnect }).await
    }

    pub fn health(&self) -> HubHealth {
        self.metrics.get_health(self.market)
    }

    async fn send(&self, command: HubCommand) -> ChartResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ChartError::internal(format!("{} hub is not running", self.market)))
    }
}

/// Hub task state
pub struct Hub {
    market: MarketCategory,
    socket_url: String,
    router: SubscriptionRouter,
    upstream: UpstreamConnection,
    metrics: Arc<ConnectionMetrics>,
    commands: mpsc::Receiver<HubCommand>,
    socket: Option<VendorStream>,
    dialing: Option<DialFuture>,
    reconnect_at: Option<Instant>,
}

impl Hub {
    /// Start a hub task for `market` and return its handle
    ///
    /// The task ends once every handle is dropped.
    pub fn spawn(market: MarketCategory, config: &HubConfig) -> HubHandle {
        let (tx, rx) = mpsc::channel(config.command_buffer);
        let metrics = Arc::new(ConnectionMetrics::new());

        let hub = Hub {
            market,
            socket_url: config.vendor.socket_url(market),
            router: SubscriptionRouter::new(),
            upstream: UpstreamConnection::new(
                market,
                config.vendor.api_key.clone().unwrap_or_default(),
                Backoff::new(config.initial_backoff, config.max_backoff),
            ),
            metrics: Arc::clone(&metrics),
            commands: rx,
            socket: None,
            dialing: None,
            reconnect_at: None,
        };

        tokio::spawn(hub.run());
        info!("[{} Hub] Started", market);

        HubHandle {
            market,
            commands: tx,
            metrics,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                result = dial(&mut self.dialing) => {
                    self.dialing = None;
                    match result {
                        Ok(stream) => {
                            self.socket = Some(stream);
                            self.metrics.set_connected(true);
                            self.upstream.on_open();
                        }
                        Err(e) => {
                            warn!("[{} Hub] Dial failed: {}", self.market, e);
                            self.upstream.on_closed();
                        }
                    }
                }
                msg = read(&mut self.socket) => self.handle_inbound(Inbound::classify(msg)).await,
                _ = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.upstream.on_reconnect_timer();
                }
            }

            self.apply_effects().await;
            self.metrics.set_state(self.upstream.state());
            self.metrics.set_routing(
                self.router.total_subscriptions(),
                self.router.total_clients(),
            );
        }

        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
        info!("[{} Hub] Stopped", self.market);
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::ChangeSubscription { client, key } => {
                self.router
                    .change_client_subscription(client, key, &mut self.upstream);
            }
            HubCommand::DropClient(client_id) => {
                self.router.drop_client(client_id, &mut self.upstream);
            }
            HubCommand::ForceClose { reconnect } => {
                self.upstream.force_close(reconnect);
            }
        }
    }

    async fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Text(text) => {
                self.metrics.record_message();
                self.handle_text(&text);
            }
            Inbound::Ping(data) => {
                if let Some(socket) = self.socket.as_mut() {
                    if let Err(e) = socket.send(Message::Pong(data.into())).await {
                        debug!("[{} Hub] Failed to answer ping: {}", self.market, e);
                    }
                }
            }
            Inbound::Closed => self.socket_lost(),
            Inbound::Ignore => {}
        }
    }

    fn handle_text(&mut self, text: &str) {
        let mut bars = Vec::new();

        for frame in parse_message(self.market, text) {
            match frame {
                VendorFrame::Bar { key, event } => bars.push((key, event)),
                VendorFrame::Status { status, message } => {
                    // Route what arrived before a status change first
                    self.dispatch(&mut bars);
                    self.handle_status(status, &message);
                }
            }
        }

        self.dispatch(&mut bars);
    }

    fn dispatch(&self, bars: &mut Vec<(SubscriptionKey, serde_json::Value)>) {
        if bars.is_empty() {
            return;
        }
        let delivered = self.router.dispatch(bars);
        debug!(
            "[{} Hub] Routed {} events to {} clients",
            self.market,
            bars.len(),
            delivered
        );
        bars.clear();
    }

    fn handle_status(&mut self, status: VendorStatus, message: &str) {
        match status {
            VendorStatus::Connected => debug!("[{} Hub] Vendor greeting: {}", self.market, message),
            VendorStatus::AuthSuccess => self.upstream.on_auth_success(self.router.keys()),
            VendorStatus::AuthFailed => self.upstream.on_auth_failed(message),
            VendorStatus::Success => debug!("[{} Hub] Vendor ack: {}", self.market, message),
            VendorStatus::Other(other) => {
                debug!("[{} Hub] Vendor status {}: {}", self.market, other, message)
            }
        }
    }

    fn socket_lost(&mut self) {
        self.socket = None;
        self.metrics.set_connected(false);
        self.upstream.on_closed();
    }

    /// Execute every effect the state machine recorded, including the ones
    /// recorded while executing
    async fn apply_effects(&mut self) {
        let mut effects: VecDeque<UpstreamEffect> = self.upstream.take_effects().into();

        while let Some(effect) = effects.pop_front() {
            match effect {
                UpstreamEffect::Open => {
                    let url = self.socket_url.clone();
                    self.dialing = Some(Box::pin(async move { connect_vendor(&url).await }));
                }
                UpstreamEffect::Send(action) => match self.socket.as_mut() {
                    Some(socket) => {
                        debug!("[{} Hub] -> {:?}", self.market, action);
                        if let Err(e) = socket.send(Message::Text(action.to_json().into())).await {
                            warn!("[{} Hub] Send failed: {}", self.market, e);
                            self.socket_lost();
                        }
                    }
                    None => debug!("[{} Hub] No socket, dropping {:?}", self.market, action),
                },
                UpstreamEffect::Close => {
                    self.dialing = None;
                    self.metrics.set_connected(false);
                    if let Some(mut socket) = self.socket.take() {
                        if let Err(e) = socket.close(None).await {
                            debug!("[{} Hub] Close error: {}", self.market, e);
                        }
                    }
                }
                UpstreamEffect::ScheduleReconnect(delay) => {
                    self.metrics.record_reconnect();
                    self.reconnect_at = Some(Instant::now() + delay);
                }
            }

            effects.extend(self.upstream.take_effects());
        }
    }
}

async fn dial(dialing: &mut Option<DialFuture>) -> ChartResult<VendorStream> {
    match dialing {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn read(
    socket: &mut Option<VendorStream>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match socket {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
