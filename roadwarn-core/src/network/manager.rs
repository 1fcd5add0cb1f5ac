//! Connection manager for the detection-service link.
//!
//! Owns the one WebSocket session to the detection route and drives it
//! through [`ConnectionState`]: connect, keepalive, failure, backoff,
//! retry, exhaustion and explicit shutdown.
//!
//! The manager is a plain value driven by its owner: all futures it
//! needs (connect attempt, retry timer, keepalive interval, socket
//! stream) are stored inside it, so [`ConnectionManager::next_event`]
//! can sit in a `tokio::select!` without losing progress when another
//! branch wins.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use crate::error::DetectError;
use crate::network::backoff::BackoffPolicy;
use crate::network::endpoint::Endpoint;
use crate::protocol::{DetectionResult, FrameRequest, KEEPALIVE_PING, KEEPALIVE_PONG};
use crate::state::ConnectionState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ConnectAttempt = Pin<Box<dyn Future<Output = Result<WsStream, DetectError>> + Send>>;

// ── LinkConfig ───────────────────────────────────────────────────

/// Configuration for [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Where to connect.
    pub endpoint: Endpoint,
    /// Reconnect policy.
    pub backoff: BackoffPolicy,
    /// Period of the `{"type":"ping"}` keepalive while open.
    pub keepalive_interval: Duration,
    /// Deadline for one connect attempt (TCP + TLS + upgrade).
    pub connect_timeout: Duration,
    /// Deadline for the detached close handshake after `disable()`.
    pub close_timeout: Duration,
}

impl LinkConfig {
    /// Defaults for everything but the endpoint.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            backoff: BackoffPolicy::default(),
            keepalive_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
        }
    }
}

// ── Events / outcomes ────────────────────────────────────────────

/// Notifications produced by the manager, in the order they occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The link moved to a new state.
    StateChanged(ConnectionState),
    /// A result message arrived from the service.
    Result(DetectionResult),
    /// The retry budget ran out; nothing more happens until the next
    /// `enable()`.
    Exhausted {
        /// Failed attempts in this session, including the first one.
        attempts: u32,
    },
}

/// What happened to a payload handed to [`ConnectionManager::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the socket.
    Sent,
    /// The link is not open; the payload was dropped.
    NotReady,
    /// The socket rejected the write; the link entered the retry path.
    Failed,
}

// ── Link ─────────────────────────────────────────────────────────

/// Session resources. Each variant owns exactly the timer that is
/// valid for its state, so there is never more than one retry timer
/// or keepalive timer alive.
enum Link {
    Idle,
    Connecting(ConnectAttempt),
    Open { socket: WsStream, keepalive: Interval },
    Backoff(Pin<Box<Sleep>>),
}

enum Step {
    Attempt(Result<WsStream, DetectError>),
    RetryDue,
    KeepaliveDue,
    Inbound(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
}

// ── ConnectionManager ────────────────────────────────────────────

/// Single owner of the detection-service connection.
pub struct ConnectionManager {
    config: LinkConfig,
    state: ConnectionState,
    link: Link,
    /// Consecutive failed attempts in the current session.
    retries: u32,
    /// Incremented on every `enable()`; one session per enabled period.
    session: u64,
    pending: VecDeque<ConnectionEvent>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(config: LinkConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            state: ConnectionState::Disconnected,
            link: Link::Idle,
            retries: 0,
            session: 0,
            pending: VecDeque::new(),
            state_tx,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.retries
    }

    /// Identifier of the current (or last) enabled period.
    pub fn session_id(&self) -> u64 {
        self.session
    }

    /// Whether a session is alive (connecting, open or backing off).
    pub fn is_enabled(&self) -> bool {
        !matches!(self.link, Link::Idle)
    }

    /// Number of live timers (retry or keepalive). At most one.
    pub fn pending_timers(&self) -> usize {
        match self.link {
            Link::Open { .. } | Link::Backoff(_) => 1,
            Link::Idle | Link::Connecting(_) => 0,
        }
    }

    /// A watch receiver that always holds the latest state.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    // ── Public contract ──────────────────────────────────────────

    /// Start a fresh session. No-op while a session is alive.
    pub fn enable(&mut self) {
        if self.is_enabled() {
            debug!(session = self.session, "enable ignored: already enabled");
            return;
        }
        self.session += 1;
        self.retries = 0;
        info!(session = self.session, endpoint = %self.config.endpoint, "enabling detection link");
        self.start_attempt();
    }

    /// Tear the session down. No-op when already disabled.
    ///
    /// Retry and keepalive timers and any pending connect attempt are
    /// dropped before this returns. An open socket is closed on a
    /// detached task, bounded by `close_timeout`. Results not yet taken
    /// from [`next_event`](Self::next_event) are discarded.
    pub fn disable(&mut self) {
        if !self.is_enabled() {
            return;
        }
        info!(session = self.session, state = %self.state, "disabling detection link");

        self.transition(ConnectionState::begin_close);
        match std::mem::replace(&mut self.link, Link::Idle) {
            Link::Open { socket, keepalive } => {
                drop(keepalive);
                self.close_detached(socket);
            }
            other => drop(other),
        }
        self.pending
            .retain(|event| !matches!(event, ConnectionEvent::Result(_)));
        self.transition(ConnectionState::finish);
    }

    /// Submit one frame request. Only accepted while `Open`.
    pub async fn send(&mut self, request: &FrameRequest) -> Result<SendOutcome, DetectError> {
        if !self.state.is_open() {
            return Ok(SendOutcome::NotReady);
        }
        let text = request.to_json()?;
        Ok(self.send_text(text).await)
    }

    /// Wait for the next notification.
    ///
    /// Pends forever while disabled with nothing queued.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }

            let step = match &mut self.link {
                Link::Idle => std::future::pending::<Step>().await,
                Link::Connecting(attempt) => Step::Attempt(attempt.await),
                Link::Backoff(timer) => {
                    timer.as_mut().await;
                    Step::RetryDue
                }
                Link::Open { socket, keepalive } => tokio::select! {
                    frame = socket.next() => Step::Inbound(frame),
                    _ = keepalive.tick() => Step::KeepaliveDue,
                },
            };

            match step {
                Step::Attempt(Ok(socket)) => self.on_open(socket),
                Step::Attempt(Err(e)) => self.link_failed(e),
                Step::RetryDue => self.start_attempt(),
                Step::KeepaliveDue => {
                    trace!(session = self.session, "sending keepalive");
                    self.send_text(KEEPALIVE_PING.to_string()).await;
                }
                Step::Inbound(None) => self.link_failed(DetectError::ClosedByPeer),
                Step::Inbound(Some(Err(e))) => self.link_failed(e.into()),
                Step::Inbound(Some(Ok(message))) => self.on_message(message),
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────

    fn transition(&mut self, apply: fn(&mut ConnectionState) -> Result<(), DetectError>) {
        if let Err(e) = apply(&mut self.state) {
            error!(state = %self.state, "connection state machine: {e}");
            return;
        }
        debug!(session = self.session, state = %self.state, "link state changed");
        self.state_tx.send_replace(self.state);
        self.pending
            .push_back(ConnectionEvent::StateChanged(self.state));
    }

    fn start_attempt(&mut self) {
        self.transition(ConnectionState::begin_connect);

        let url = self.config.endpoint.to_string();
        let timeout = self.config.connect_timeout;
        debug!(session = self.session, attempt = self.retries + 1, "connecting to {url}");

        self.link = Link::Connecting(Box::pin(async move {
            match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
                Ok(Ok((socket, _response))) => Ok(socket),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(DetectError::Timeout(timeout)),
            }
        }));
    }

    fn on_open(&mut self, socket: WsStream) {
        let period = self.config.keepalive_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.retries = 0;
        self.link = Link::Open { socket, keepalive };
        self.transition(ConnectionState::open);
        info!(session = self.session, "detection link open");
    }

    fn on_message(&mut self, message: Message) {
        let result = match message {
            Message::Text(text) if text.trim() == KEEPALIVE_PONG => {
                trace!("keepalive acknowledged");
                return;
            }
            Message::Text(text) => DetectionResult::parse_or_unreadable(&text),
            Message::Binary(data) => DetectionResult::parse_slice(&data).unwrap_or_else(|e| {
                warn!("unparseable binary detection payload: {e}");
                DetectionResult::unreadable()
            }),
            Message::Close(frame) => {
                debug!(?frame, "peer sent close frame");
                self.link_failed(DetectError::ClosedByPeer);
                return;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return,
        };
        self.pending.push_back(ConnectionEvent::Result(result));
    }

    async fn send_text(&mut self, text: String) -> SendOutcome {
        let Link::Open { socket, .. } = &mut self.link else {
            return SendOutcome::NotReady;
        };
        let written = socket.send(Message::Text(text)).await;
        match written {
            Ok(()) => SendOutcome::Sent,
            Err(e) => {
                self.link_failed(e.into());
                SendOutcome::Failed
            }
        }
    }

    fn link_failed(&mut self, cause: DetectError) {
        warn!(
            session = self.session,
            state = %self.state,
            retries = self.retries,
            "detection link failed: {cause}"
        );
        self.link = Link::Idle;
        self.transition(ConnectionState::fail);
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        let policy = &self.config.backoff;
        if policy.is_exhausted(self.retries) {
            let attempts = self.retries + 1;
            error!(
                session = self.session,
                attempts, "retry budget exhausted; giving up until re-enabled"
            );
            self.transition(ConnectionState::finish);
            self.pending
                .push_back(ConnectionEvent::Exhausted { attempts });
            return;
        }

        let delay = policy.delay(self.retries);
        self.retries += 1;
        info!(
            session = self.session,
            retry = self.retries,
            "reconnecting in {}ms",
            delay.as_millis()
        );
        self.link = Link::Backoff(Box::pin(tokio::time::sleep(delay)));
    }

    fn close_detached(&self, mut socket: WsStream) {
        let timeout = self.config.close_timeout;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn(async move {
            match tokio::time::timeout(timeout, socket.close(None)).await {
                Ok(Ok(())) => trace!("detection link closed"),
                Ok(Err(e)) => debug!("close handshake failed: {e}"),
                Err(_) => debug!("close handshake timed out after {timeout:?}"),
            }
        });
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disable();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// An endpoint on a port that refuses connections.
    async fn refused_endpoint() -> Endpoint {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        Endpoint::parse(&format!("ws://{addr}/api/v1/ws/detect")).unwrap()
    }

    fn fast_config(endpoint: Endpoint, max_retries: u32) -> LinkConfig {
        LinkConfig {
            backoff: BackoffPolicy {
                base: Duration::from_millis(5),
                growth: 2.0,
                cap: Duration::from_millis(40),
                jitter: Duration::from_millis(3),
                max_retries,
            },
            connect_timeout: Duration::from_secs(2),
            ..LinkConfig::new(endpoint)
        }
    }

    async fn next(manager: &mut ConnectionManager) -> ConnectionEvent {
        tokio::time::timeout(Duration::from_secs(5), manager.next_event())
            .await
            .expect("timed out waiting for a connection event")
    }

    #[test]
    fn idle_manager_has_no_events() {
        let endpoint = Endpoint::parse("ws://127.0.0.1:9/api/v1/ws/detect").unwrap();
        let mut manager = ConnectionManager::new(LinkConfig::new(endpoint));
        let mut next = tokio_test::task::spawn(manager.next_event());
        tokio_test::assert_pending!(next.poll());
        drop(next);
        assert_eq!(manager.pending_timers(), 0);
    }

    #[tokio::test]
    async fn send_is_not_ready_while_disconnected() {
        let mut manager = ConnectionManager::new(LinkConfig::new(refused_endpoint().await));
        let request = FrameRequest::new(b"jpeg", &Default::default());
        assert_eq!(manager.send(&request).await.unwrap(), SendOutcome::NotReady);
    }

    #[tokio::test]
    async fn enable_is_idempotent() {
        let mut manager = ConnectionManager::new(fast_config(refused_endpoint().await, 3));
        manager.enable();
        manager.enable();
        assert_eq!(manager.session_id(), 1);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(next(&mut manager).await, ConnectionEvent::StateChanged(ConnectionState::Connecting));
    }

    #[tokio::test]
    async fn failures_back_off_then_exhaust() {
        let mut manager = ConnectionManager::new(fast_config(refused_endpoint().await, 3));
        manager.enable();

        let mut observed_retries = Vec::new();
        let attempts = loop {
            match next(&mut manager).await {
                ConnectionEvent::StateChanged(ConnectionState::Error) => {
                    observed_retries.push(manager.retry_count());
                }
                ConnectionEvent::Exhausted { attempts } => break attempts,
                ConnectionEvent::Result(r) => panic!("unexpected result {r:?}"),
                ConnectionEvent::StateChanged(_) => {}
            }
        };

        assert_eq!(attempts, 4);
        assert!(observed_retries.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.pending_timers(), 0);
        assert!(!manager.is_enabled());
    }

    #[tokio::test]
    async fn re_enable_after_exhaustion_starts_fresh_session() {
        let mut manager = ConnectionManager::new(fast_config(refused_endpoint().await, 0));
        manager.enable();
        loop {
            if let ConnectionEvent::Exhausted { attempts } = next(&mut manager).await {
                assert_eq!(attempts, 1);
                break;
            }
        }
        manager.enable();
        assert_eq!(manager.session_id(), 2);
        assert_eq!(manager.retry_count(), 0);
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn disable_during_backoff_cancels_retry_timer() {
        let mut manager = ConnectionManager::new(fast_config(refused_endpoint().await, 5));
        manager.enable();
        while manager.state() != ConnectionState::Error {
            next(&mut manager).await;
        }
        assert_eq!(manager.pending_timers(), 1);

        manager.disable();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.pending_timers(), 0);

        // Drain whatever was queued: the tail must be Closing → Disconnected
        // and no further attempt may follow.
        let mut tail = Vec::new();
        while let Ok(event) =
            tokio::time::timeout(Duration::from_millis(200), manager.next_event()).await
        {
            tail.push(event);
        }
        assert_eq!(
            &tail[tail.len() - 2..],
            &[
                ConnectionEvent::StateChanged(ConnectionState::Closing),
                ConnectionEvent::StateChanged(ConnectionState::Disconnected),
            ]
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn rapid_toggling_leaks_no_timers() {
        let mut manager = ConnectionManager::new(fast_config(refused_endpoint().await, 5));
        for _ in 0..10 {
            manager.enable();
            manager.disable();
        }
        assert_eq!(manager.session_id(), 10);
        assert_eq!(manager.pending_timers(), 0);
        assert!(!manager.is_enabled());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disable_is_idempotent() {
        let mut manager = ConnectionManager::new(LinkConfig::new(refused_endpoint().await));
        manager.disable();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), manager.next_event())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn state_watch_follows_transitions() {
        let mut manager = ConnectionManager::new(fast_config(refused_endpoint().await, 1));
        let rx = manager.subscribe_state();
        manager.enable();
        assert_eq!(*rx.borrow(), ConnectionState::Connecting);
        manager.disable();
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
    }
}
