//! Hub end-to-end tests against a local fake vendor

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use chart_core::{Cadence, ConnectionState, MarketCategory, SubscriptionKey};
use chart_services::{ClientConnection, ClientId, Hub, HubConfig, HubRegistry, WebSocketState};
use chart_vendor::VendorConfig;

const WAIT: Duration = Duration::from_secs(5);
const AUTH_SUCCESS: &str = r#"[{"ev":"status","status":"auth_success","message":"authenticated"}]"#;
const AUTH_FAILED: &str = r#"[{"ev":"status","status":"auth_failed","message":"authentication failed"}]"#;

/// One accepted vendor socket
struct Session {
    outgoing: mpsc::UnboundedSender<Message>,
    received: mpsc::UnboundedReceiver<String>,
}

impl Session {
    async fn next_action(&mut self) -> Value {
        let text = timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for hub message")
            .expect("hub closed the socket");
        serde_json::from_str(&text).unwrap()
    }

    async fn is_closed(&mut self) -> bool {
        matches!(timeout(WAIT, self.received.recv()).await, Ok(None))
    }

    fn send(&self, text: &str) {
        self.outgoing
            .send(Message::Text(text.to_string().into()))
            .unwrap();
    }

    fn close(&self) {
        let _ = self.outgoing.send(Message::Close(None));
    }

    async fn authenticate(&mut self) {
        assert_eq!(
            self.next_action().await,
            json!({"action": "auth", "params": "test-key"})
        );
        self.send(AUTH_SUCCESS);
    }
}

struct FakeVendor {
    url: String,
    sessions: mpsc::UnboundedReceiver<Session>,
}

impl FakeVendor {
    async fn start() -> Self {
        Self::serve(TcpListener::bind("127.0.0.1:0").await.unwrap())
    }

    fn serve(listener: TcpListener) -> Self {
        let addr = listener.local_addr().unwrap();
        let (session_tx, sessions) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let (mut sink, mut source) = ws.split();
                let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
                let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

                tokio::spawn(async move {
                    while let Some(msg) = out_rx.recv().await {
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                });
                tokio::spawn(async move {
                    while let Some(Ok(msg)) = source.next().await {
                        if let Message::Text(text) = msg {
                            if in_tx.send(text.to_string()).is_err() {
                                break;
                            }
                        }
                    }
                });

                let _ = out_tx.send(Message::Text(
                    r#"[{"ev":"status","status":"connected","message":"Connected Successfully"}]"#
                        .to_string()
                        .into(),
                ));
                if session_tx
                    .send(Session {
                        outgoing: out_tx,
                        received: in_rx,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });

        Self {
            url: format!("ws://{}", addr),
            sessions,
        }
    }

    async fn next_session(&mut self) -> Session {
        timeout(WAIT, self.sessions.recv())
            .await
            .expect("hub never connected")
            .expect("vendor stopped")
    }

    async fn no_session_within(&mut self, wait: Duration) -> bool {
        timeout(wait, self.sessions.recv()).await.is_err()
    }

    fn hub_config(&self) -> HubConfig {
        HubConfig {
            vendor: VendorConfig {
                api_key: Some("test-key".to_string()),
                ws_base_url: self.url.clone(),
                rest_base_url: "http://127.0.0.1:9".to_string(),
            },
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(100),
            command_buffer: 16,
        }
    }
}

fn client(id: u64) -> (ClientConnection, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(16);
    (ClientConnection::new(ClientId(id), tx), rx)
}

fn stock(symbol: &str) -> SubscriptionKey {
    SubscriptionKey::new(MarketCategory::Stocks, symbol, Cadence::Second)
}

async fn next_payload(rx: &mut mpsc::Receiver<String>) -> Value {
    let text = timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for client payload")
        .expect("client channel closed");
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_subscribe_route_and_idle_close() {
    let mut vendor = FakeVendor::start().await;
    let hub = Hub::spawn(MarketCategory::Stocks, &vendor.hub_config());
    let (alice, mut alice_rx) = client(1);

    hub.change_client_subscription(alice, stock("AAPL")).await.unwrap();

    let mut session = vendor.next_session().await;
    session.authenticate().await;
    assert_eq!(
        session.next_action().await,
        json!({"action": "subscribe", "params": "A.AAPL"})
    );

    session.send(
        r#"[{"ev":"A","sym":"AAPL","o":1,"h":2,"l":1,"c":1.5,"s":1000},
            {"ev":"A","sym":"MSFT","o":1,"h":2,"l":1,"c":1.5,"s":1000},
            {"ev":"AM","sym":"AAPL","o":1,"h":2,"l":1,"c":1.5,"s":1000}]"#,
    );
    let payload = next_payload(&mut alice_rx).await;
    assert_eq!(payload.as_array().unwrap().len(), 1);
    assert_eq!(payload[0]["sym"], "AAPL");
    assert_eq!(payload[0]["ev"], "A");

    let health = hub.health();
    assert_eq!(health.state, ConnectionState::Authenticated);
    assert_eq!(health.active_keys, 1);
    assert!(health.message_count >= 2);

    hub.drop_client(ClientId(1)).await.unwrap();
    assert_eq!(
        session.next_action().await,
        json!({"action": "unsubscribe", "params": "A.AAPL"})
    );
    assert!(session.is_closed().await);

    // Idle close never reconnects
    assert!(vendor.no_session_within(Duration::from_millis(300)).await);
}

#[tokio::test]
async fn test_shared_key_is_subscribed_once() {
    let mut vendor = FakeVendor::start().await;
    let hub = Hub::spawn(MarketCategory::Crypto, &vendor.hub_config());
    let key = SubscriptionKey::new(MarketCategory::Crypto, "BTC-USD", Cadence::Second);
    let (alice, mut alice_rx) = client(1);
    let (bob, mut bob_rx) = client(2);

    hub.change_client_subscription(alice, key.clone()).await.unwrap();
    hub.change_client_subscription(bob, key.clone()).await.unwrap();

    let mut session = vendor.next_session().await;
    session.authenticate().await;
    assert_eq!(
        session.next_action().await,
        json!({"action": "subscribe", "params": "XAS.X:BTC-USD"})
    );

    session.send(r#"[{"ev":"XAS","pair":"BTC-USD","o":1,"h":2,"l":1,"c":1.5,"s":1000}]"#);
    assert_eq!(next_payload(&mut alice_rx).await[0]["pair"], "BTC-USD");
    assert_eq!(next_payload(&mut bob_rx).await[0]["pair"], "BTC-USD");

    hub.drop_client(ClientId(1)).await.unwrap();
    hub.drop_client(ClientId(2)).await.unwrap();

    // The first departure issues nothing, so the next message is the only unsubscribe
    assert_eq!(
        session.next_action().await,
        json!({"action": "unsubscribe", "params": "XAS.X:BTC-USD"})
    );
    assert!(session.is_closed().await);
}

#[tokio::test]
async fn test_reconnect_resubscribes_active_keys() {
    let mut vendor = FakeVendor::start().await;
    let hub = Hub::spawn(MarketCategory::Stocks, &vendor.hub_config());
    let (alice, _alice_rx) = client(1);

    hub.change_client_subscription(alice, stock("AAPL")).await.unwrap();

    let mut first = vendor.next_session().await;
    first.authenticate().await;
    assert_eq!(
        first.next_action().await,
        json!({"action": "subscribe", "params": "A.AAPL"})
    );
    first.close();

    let mut second = vendor.next_session().await;
    second.authenticate().await;
    assert_eq!(
        second.next_action().await,
        json!({"action": "subscribe", "params": "A.AAPL"})
    );
    assert!(hub.health().reconnect_count >= 1);
}

#[tokio::test]
async fn test_failed_dial_backs_off_and_recovers() {
    // Reserve a port, then free it so the first dials are refused
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let mut config = FakeVendor::start().await.hub_config();
    config.vendor.ws_base_url = format!("ws://{}", addr);

    let hub = Hub::spawn(MarketCategory::Stocks, &config);
    let (alice, mut alice_rx) = client(1);
    hub.change_client_subscription(alice, stock("AAPL")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let health = hub.health();
    assert!(health.reconnect_count >= 1);
    assert!(!health.connected);
    assert_eq!(health.active_keys, 1);

    let mut vendor = FakeVendor::serve(TcpListener::bind(addr).await.unwrap());
    let mut session = vendor.next_session().await;
    session.authenticate().await;
    assert_eq!(
        session.next_action().await,
        json!({"action": "subscribe", "params": "A.AAPL"})
    );

    session.send(r#"[{"ev":"A","sym":"AAPL","o":1,"h":2,"l":1,"c":1.5,"s":1000}]"#);
    let payload = next_payload(&mut alice_rx).await;
    assert_eq!(payload[0]["sym"], "AAPL");
    assert_eq!(hub.health().state, ConnectionState::Authenticated);
}

#[tokio::test]
async fn test_auth_failure_waits_for_new_subscription() {
    let mut vendor = FakeVendor::start().await;
    let hub = Hub::spawn(MarketCategory::Stocks, &vendor.hub_config());
    let (alice, _alice_rx) = client(1);
    let (bob, _bob_rx) = client(2);

    hub.change_client_subscription(alice, stock("AAPL")).await.unwrap();

    let mut session = vendor.next_session().await;
    assert_eq!(session.next_action().await["action"], "auth");
    session.send(AUTH_FAILED);
    assert!(session.is_closed().await);
    assert!(vendor.no_session_within(Duration::from_millis(300)).await);

    hub.change_client_subscription(bob, stock("MSFT")).await.unwrap();
    let mut retry = vendor.next_session().await;
    retry.authenticate().await;

    let mut subscribed = vec![
        retry.next_action().await["params"].as_str().unwrap().to_string(),
        retry.next_action().await["params"].as_str().unwrap().to_string(),
    ];
    subscribed.sort();
    assert_eq!(subscribed, vec!["A.AAPL", "A.MSFT"]);
}

#[tokio::test]
async fn test_force_close_with_reconnect() {
    let mut vendor = FakeVendor::start().await;
    let hub = Hub::spawn(MarketCategory::Stocks, &vendor.hub_config());
    let (alice, _alice_rx) = client(1);

    hub.change_client_subscription(alice, stock("AAPL")).await.unwrap();
    let mut session = vendor.next_session().await;
    session.authenticate().await;
    session.next_action().await;

    hub.force_close(true).await.unwrap();
    assert!(session.is_closed().await);

    let mut again = vendor.next_session().await;
    again.authenticate().await;
    assert_eq!(
        again.next_action().await,
        json!({"action": "subscribe", "params": "A.AAPL"})
    );
}

#[tokio::test]
async fn test_front_door_switches_hubs() {
    let mut stocks_vendor = FakeVendor::start().await;
    let mut crypto_vendor = FakeVendor::start().await;
    let hubs = HubRegistry::from_handles([
        Hub::spawn(MarketCategory::Stocks, &stocks_vendor.hub_config()),
        Hub::spawn(MarketCategory::Crypto, &crypto_vendor.hub_config()),
    ]);
    let state = WebSocketState::new(hubs);
    let client_id = state.new_client_id();
    let (tx, mut rx) = mpsc::channel(16);

    // Malformed requests are dropped without touching any hub
    assert!(state.handle_text(client_id, "not json", &tx).await.is_err());
    assert!(state.handle_text(client_id, r#"{"ticker":""}"#, &tx).await.is_err());
    assert_eq!(state.clients.current(client_id), None);

    state
        .handle_text(client_id, r#"{"ticker":"AAPL"}"#, &tx)
        .await
        .unwrap();
    let mut stocks = stocks_vendor.next_session().await;
    stocks.authenticate().await;
    assert_eq!(stocks.next_action().await["params"], "A.AAPL");
    assert_eq!(state.clients.current(client_id), Some(MarketCategory::Stocks));

    state
        .handle_text(
            client_id,
            r#"{"ticker":"BTC-USD","market":"crypto","interval":"minute"}"#,
            &tx,
        )
        .await
        .unwrap();
    assert_eq!(
        stocks.next_action().await,
        json!({"action": "unsubscribe", "params": "A.AAPL"})
    );
    assert!(stocks.is_closed().await);

    let mut crypto = crypto_vendor.next_session().await;
    crypto.authenticate().await;
    assert_eq!(crypto.next_action().await["params"], "XA.X:BTC-USD");
    assert_eq!(state.clients.current(client_id), Some(MarketCategory::Crypto));

    crypto.send(r#"[{"ev":"XA","pair":"BTC-USD","o":1,"h":2,"l":1,"c":1.5,"s":60000}]"#);
    assert_eq!(next_payload(&mut rx).await[0]["ev"], "XA");

    state.disconnect(client_id).await;
    assert_eq!(
        crypto.next_action().await,
        json!({"action": "unsubscribe", "params": "XA.X:BTC-USD"})
    );
    assert!(state.clients.is_empty());
}
