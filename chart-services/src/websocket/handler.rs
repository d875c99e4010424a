//! WebSocket connection handler
//!
//! Handles individual browser connections: assigns an id, parses
//! subscription requests and hands them to the right hub.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use chart_core::{ChartResult, SubscriptionRequest};

use super::registry::{ClientRegistry, HubRegistry};
use super::subscription::{ClientConnection, ClientId};
use crate::health::ServerHealth;

/// Outbound queue depth per browser
const OUTGOING_BUFFER: usize = 100;

/// Shared state for WebSocket handlers
#[derive(Clone)]
pub struct WebSocketState {
    pub hubs: Arc<HubRegistry>,
    pub clients: Arc<ClientRegistry>,
    next_client_id: Arc<AtomicU64>,
}

impl WebSocketState {
    pub fn new(hubs: HubRegistry) -> Self {
        Self {
            hubs: Arc::new(hubs),
            clients: Arc::new(ClientRegistry::new()),
            next_client_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Generate a new unique client ID
    pub fn new_client_id(&self) -> ClientId {
        ClientId(self.next_client_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn health(&self) -> ServerHealth {
        ServerHealth::new(self.hubs.health(), self.clients.len())
    }

    /// Handle a new WebSocket connection
    ///
    /// Runs until the browser goes away, then releases the client's
    /// subscription on whichever hub it was attached to.
    pub async fn handle_connection<S>(&self, socket: S)
    where
        S: futures_util::Stream<
                Item = Result<
                    tokio_tungstenite::tungstenite::Message,
                    tokio_tungstenite::tungstenite::Error,
                >,
            > + futures_util::Sink<
                tokio_tungstenite::tungstenite::Message,
                Error = tokio_tungstenite::tungstenite::Error,
            > + Send
            + 'static,
    {
        let client_id = self.new_client_id();
        info!("New WebSocket connection: {}", client_id);

        let (mut ws_sender, mut ws_receiver) = socket.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(OUTGOING_BUFFER);

        // Task: Send outgoing messages to WebSocket
        let send_task = tokio::spawn(async move {
            while let Some(payload) = outgoing_rx.recv().await {
                if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
        });

        // Task: Receive and process incoming messages
        let recv_task = async {
            while let Some(result) = ws_receiver.next().await {
                match result {
                    Ok(Message::Text(text)) => {
                        if let Err(e) = self.handle_text(client_id, &text, &outgoing_tx).await {
                            warn!("Dropping message from {}: {}", client_id, e);
                        }
                    }
                    Ok(Message::Ping(_)) => {
                        // Handled automatically by tungstenite
                        debug!("Received ping from {}", client_id);
                    }
                    Ok(Message::Close(_)) => {
                        debug!("Received close from {}", client_id);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("WebSocket error for {}: {}", client_id, e);
                        break;
                    }
                }
            }
        };

        // Wait for either side to finish (connection closed)
        tokio::select! {
            _ = send_task => {}
            _ = recv_task => {}
        }

        self.disconnect(client_id).await;
        info!("WebSocket connection closed: {}", client_id);
    }

    /// Apply one subscription request
    ///
    /// Moving to another category releases the old hub first.
    pub async fn handle_text(
        &self,
        client_id: ClientId,
        text: &str,
        outgoing_tx: &mpsc::Sender<String>,
    ) -> ChartResult<()> {
        let request = SubscriptionRequest::parse(text)?;
        let market = request.market();
        let key = request.key();

        if let Some(previous) = self.clients.current(client_id) {
            if previous != market {
                debug!("{} switching from {} to {}", client_id, previous, market);
                self.hubs.get(previous)?.drop_client(client_id).await?;
            }
        }

        self.hubs
            .get(market)?
            .change_client_subscription(ClientConnection::new(client_id, outgoing_tx.clone()), key)
            .await?;
        self.clients.set(client_id, market);

        Ok(())
    }

    /// Release a client on its current hub
    pub async fn disconnect(&self, client_id: ClientId) {
        let Some(market) = self.clients.remove(client_id) else {
            return;
        };

        let result = match self.hubs.get(market) {
            Ok(hub) => hub.drop_client(client_id).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Failed to release {} on {} hub: {}", client_id, market, e);
        }
    }
}

impl std::fmt::Debug for WebSocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketState")
            .field("hubs", &self.hubs)
            .field("clients", &self.clients.len())
            .finish()
    }
}
