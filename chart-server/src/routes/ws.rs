//! Browser WebSocket endpoint
//!
//! axum owns the socket; the connection handler in `chart-services` speaks
//! tungstenite messages. `BridgeStream` joins the two with a pair of
//! channels.

use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{info, warn};

use crate::AppState;

/// Bridge channel depth in each direction
const BRIDGE_BUFFER: usize = 100;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn to_tungstenite(msg: AxumMessage) -> Option<Message> {
    match msg {
        AxumMessage::Text(text) => Some(Message::Text(text.to_string().into())),
        AxumMessage::Binary(data) => Some(Message::Binary(data)),
        AxumMessage::Ping(data) => Some(Message::Ping(data)),
        AxumMessage::Pong(data) => Some(Message::Pong(data)),
        AxumMessage::Close(_) => None,
    }
}

fn to_axum(msg: Message) -> Option<AxumMessage> {
    match msg {
        Message::Text(text) => Some(AxumMessage::Text(text.to_string().into())),
        Message::Binary(data) => Some(AxumMessage::Binary(data)),
        Message::Ping(data) => Some(AxumMessage::Ping(data)),
        Message::Pong(data) => Some(AxumMessage::Pong(data)),
        Message::Close(_) | Message::Frame(_) => None,
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (inbound_tx, inbound_rx) = mpsc::channel::<Message>(BRIDGE_BUFFER);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(BRIDGE_BUFFER);

    // Browser -> handler; a close frame or socket error ends the stream
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Some(msg) = to_tungstenite(msg) else {
                break;
            };
            if inbound_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Handler -> browser
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let Some(msg) = to_axum(msg) else {
                break;
            };
            if sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let bridge = BridgeStream {
        inbound: inbound_rx,
        outbound: outbound_tx,
    };
    state.ws_state.handle_connection(bridge).await;

    recv_task.abort();
    send_task.abort();
}

/// Channel pair presented to the handler as a tungstenite socket
struct BridgeStream {
    inbound: mpsc::Receiver<Message>,
    outbound: mpsc::Sender<Message>,
}

impl futures_util::Stream for BridgeStream {
    type Item = Result<Message, WsError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbound.poll_recv(cx).map(|msg| msg.map(Ok))
    }
}

impl futures_util::Sink<Message> for BridgeStream {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        match self.outbound.try_send(item) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Browser socket is backed up, dropping message");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(WsError::ConnectionClosed),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
