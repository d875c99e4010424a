//! Upstream connection state machine
//!
//! One `UpstreamConnection` per market category. It holds no socket: every
//! transition records `UpstreamEffect`s that the owning hub task executes
//! (dial, send, close, arm the reconnect timer). That keeps auth, queueing
//! and backoff deterministic and testable without a network.
//!
//! ```text
//! Disconnected --connect()--> Connecting --open--> AuthPending --auth_success--> Authenticated
//!      ^                                                                            |
//!      +------------------------------ close / error -------------------------------+
//! ```

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use chart_core::{ConnectionState, MarketCategory, SubscriptionKey};

use crate::protocol::VendorAction;

/// First reconnect delay
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(1_000);

/// Reconnect delay cap
pub const MAX_BACKOFF: Duration = Duration::from_millis(15_000);

/// Exponential reconnect backoff
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay the next reconnect would wait
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Take the current delay and double it for the next failure, capped
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

/// Side effect requested by a transition, executed by the hub task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEffect {
    /// Dial the vendor socket
    Open,
    /// Write one control message to the open socket
    Send(VendorAction),
    /// Drop the socket (or abandon the dial)
    Close,
    /// Arm the one-shot reconnect timer
    ScheduleReconnect(Duration),
}

/// Connection state for one vendor socket
#[derive(Debug)]
pub struct UpstreamConnection {
    market: MarketCategory,
    api_key: String,
    state: ConnectionState,
    should_reconnect: bool,
    backoff: Backoff,
    /// Subscribe/unsubscribe issued before auth completed
    pending: VecDeque<VendorAction>,
    effects: Vec<UpstreamEffect>,
}

impl UpstreamConnection {
    pub fn new(market: MarketCategory, api_key: impl Into<String>, backoff: Backoff) -> Self {
        let api_key = api_key.into();
        if api_key.is_empty() {
            warn!("[{} WS] No vendor API key configured, auth will fail", market);
        }

        Self {
            market,
            api_key,
            state: ConnectionState::Disconnected,
            should_reconnect: false,
            backoff,
            pending: VecDeque::new(),
            effects: Vec::new(),
        }
    }

    pub fn market(&self) -> MarketCategory {
        self.market
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn pending(&self) -> impl Iterator<Item = &VendorAction> {
        self.pending.iter()
    }

    /// Take the effects recorded since the last call
    pub fn take_effects(&mut self) -> Vec<UpstreamEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Open the vendor socket unless one is already dialing or open
    pub fn connect(&mut self) {
        if self.state.is_active() {
            return;
        }

        info!("[{} WS] Connecting", self.market);
        self.state = ConnectionState::Connecting;
        self.should_reconnect = true;
        self.effects.push(UpstreamEffect::Open);
    }

    /// Send now if authenticated, otherwise queue until auth and make sure
    /// a connection is on its way
    pub fn send_or_queue(&mut self, action: VendorAction) {
        if self.state == ConnectionState::Authenticated {
            self.effects.push(UpstreamEffect::Send(action));
            return;
        }

        debug!("[{} WS] Queueing {:?} until authenticated", self.market, action);
        self.pending.push_back(action);
        self.connect();
    }

    /// Socket is open: authenticate
    pub fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!("[{} WS] Ignoring open in state {:?}", self.market, self.state);
            return;
        }

        info!("[{} WS] Connected, authenticating", self.market);
        self.state = ConnectionState::AuthPending;
        self.effects
            .push(UpstreamEffect::Send(VendorAction::Auth(self.api_key.clone())));
    }

    /// Vendor accepted our key
    ///
    /// Re-subscribes every active key that has no queued action of its own,
    /// then flushes the queue in order. Keys with queued actions get their
    /// final state from the queue, so nothing is subscribed twice.
    pub fn on_auth_success<I>(&mut self, active_keys: I)
    where
        I: IntoIterator<Item = SubscriptionKey>,
    {
        if self.state != ConnectionState::AuthPending {
            debug!("[{} WS] Ignoring auth_success in state {:?}", self.market, self.state);
            return;
        }

        info!("[{} WS] Authenticated", self.market);
        self.state = ConnectionState::Authenticated;
        self.backoff.reset();

        let queued: HashSet<SubscriptionKey> =
            self.pending.iter().filter_map(|a| a.key().cloned()).collect();

        for key in active_keys {
            if !queued.contains(&key) {
                self.effects
                    .push(UpstreamEffect::Send(VendorAction::Subscribe(key)));
            }
        }

        for action in self.pending.drain(..) {
            self.effects.push(UpstreamEffect::Send(action));
        }
    }

    /// Vendor rejected our key: close and stay down until a new subscription
    pub fn on_auth_failed(&mut self, message: &str) {
        error!("[{} WS] Authentication failed: {}", self.market, message);
        self.close(false);
    }

    /// Socket closed, errored or the dial failed
    pub fn on_closed(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }

        self.state = ConnectionState::Disconnected;
        if self.should_reconnect {
            self.schedule_reconnect();
        } else {
            info!("[{} WS] Closed, not reconnecting", self.market);
        }
    }

    /// Reconnect timer fired
    pub fn on_reconnect_timer(&mut self) {
        if !self.should_reconnect {
            debug!("[{} WS] Reconnect timer fired after close, ignoring", self.market);
            return;
        }
        if self.state.is_active() {
            return;
        }

        self.connect();
    }

    /// Intentional close after the last subscriber left
    pub fn idle_close(&mut self) {
        info!("[{} WS] No subscriptions left, closing", self.market);
        self.pending.clear();
        self.close(false);
    }

    /// Operator close, optionally letting the reconnect path run
    pub fn force_close(&mut self, reconnect: bool) {
        warn!(
            "[{} WS] Force close requested (reconnect: {})",
            self.market, reconnect
        );
        self.close(reconnect);
    }

    fn close(&mut self, reconnect: bool) {
        self.should_reconnect = reconnect;
        let was_active = self.state.is_active();
        self.state = ConnectionState::Disconnected;

        if was_active {
            self.effects.push(UpstreamEffect::Close);
        }
        if reconnect {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.next_delay();
        info!("[{} WS] Reconnecting in {:?}", self.market, delay);
        self.effects.push(UpstreamEffect::ScheduleReconnect(delay));
    }
}
