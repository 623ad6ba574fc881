//! Resilient STOMP broker connection.
//!
//! [`ConnectionManager`] owns the process's single broker connection. It runs
//! one background task per `connect()` that:
//!
//! 1. opens the WebSocket and performs the STOMP handshake,
//! 2. replays every registered topic subscription,
//! 3. pumps inbound frames to the [`SubscriptionRegistry`] and outbound frames
//!    to the socket while exchanging heart-beats,
//! 4. on an unrequested close, waits a fixed delay and starts again, giving up
//!    after a bounded number of attempts. A handshake the broker answers with
//!    ERROR is final and is not retried.
//!
//! # Architecture
//!
//! ```text
//!   subscribe / publish            ConnectionEvent (broadcast)
//!          │                        ConnectionState (watch)
//!          ▼                                 ▲
//!   ┌──────────────────┐   Outbound   ┌──────┴───────┐
//!   │ ConnectionManager│ ───────────▶ │ session task │ ◀──▶ broker
//!   └──────────────────┘   (mpsc)     └──────┬───────┘
//!                                            │ MESSAGE frames
//!                                            ▼
//!                                SubscriptionRegistry ──▶ SubscriptionHandle
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use ridesync_rs::ws::connection::{ConnectionConfig, ConnectionManager};
//!
//! # #[tokio::main]
//! # async fn main() -> ridesync_rs::error::Result<()> {
//! let config = ConnectionConfig::builder()
//!     .broker_url("ws://localhost:8080/ws-uber/websocket")
//!     .token("jwt")
//!     .build()?;
//! let manager = ConnectionManager::new(config);
//! manager.connect().await?;
//!
//! if let Some(mut status) = manager.subscribe("/topic/user/b7c1/ride-status") {
//!     while let Some(message) = status.recv().await {
//!         println!("{}", message.body);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::constants::{BROKER_URL, timing, topics};
use crate::error::{RideError, Result};
use crate::types::enums::{ConnectionIndicator, ConnectionState};
use crate::types::messages::{ChatMessage, RideResponseMessage};
use crate::ws::registry::{Outbound, SubscriptionHandle, SubscriptionRegistry, TopicMessage};
use crate::ws::stomp::{Command, Frame, HeartBeat, parse_frames, parse_frames_lossy};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Connection lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The STOMP session is established and subscriptions are restored.
    Ready,
    /// A retry is scheduled after the reconnect delay.
    Reconnecting { attempt: u32 },
    /// A transport or protocol failure, for user-visible feedback.
    Error(String),
    /// Retries are exhausted; the manager stays down until `connect()`.
    Failed { attempts: u32 },
    /// `disconnect()` completed.
    Closed,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Raw WebSocket endpoint of the broker.
    pub broker_url: String,
    /// Virtual host sent in the CONNECT frame.
    pub host: String,
    /// Extra CONNECT headers (`Authorization`, `login`, `passcode`, …).
    pub connect_headers: Vec<(String, String)>,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Reconnect attempts before the connection is declared failed.
    pub max_reconnect_attempts: u32,
    /// Heart-beat intervals offered to the broker.
    pub heart_beat: HeartBeat,
    /// Upper bound on socket open plus STOMP handshake.
    pub handshake_timeout: Duration,
    /// Capacity of the [`ConnectionEvent`] broadcast channel.
    pub event_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            broker_url: BROKER_URL.to_owned(),
            host: "localhost".to_owned(),
            connect_headers: Vec::new(),
            reconnect_delay: Duration::from_millis(timing::RECONNECT_DELAY_MS),
            max_reconnect_attempts: timing::MAX_RECONNECT_ATTEMPTS,
            heart_beat: HeartBeat::symmetric(Duration::from_millis(timing::HEARTBEAT_MS)),
            handshake_timeout: Duration::from_millis(timing::HANDSHAKE_TIMEOUT_MS),
            event_capacity: 64,
        }
    }
}

impl ConnectionConfig {
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Build a configuration from `RIDESYNC_BROKER_URL` and `RIDESYNC_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();
        if let Ok(url) = std::env::var("RIDESYNC_BROKER_URL") {
            builder = builder.broker_url(url);
        }
        match std::env::var("RIDESYNC_TOKEN") {
            Ok(token) if !token.is_empty() => builder.token(token).build(),
            _ => builder.build(),
        }
    }
}

/// Builder for [`ConnectionConfig`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use ridesync_rs::ws::connection::ConnectionConfig;
///
/// let config = ConnectionConfig::builder()
///     .broker_url("ws://broker.internal:8080/ws-uber/websocket")
///     .reconnect_delay(Duration::from_secs(2))
///     .max_reconnect_attempts(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.host, "broker.internal");
/// ```
#[derive(Debug, Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
    host: Option<String>,
}

impl ConnectionConfigBuilder {
    pub fn broker_url(mut self, url: impl Into<String>) -> Self {
        self.config.broker_url = url.into();
        self
    }

    /// Set the STOMP virtual host. Default: the host of the broker URL.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Send `Authorization: Bearer <token>` with CONNECT.
    pub fn token(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("Authorization", value)
    }

    /// Send `login` / `passcode` with CONNECT.
    pub fn login(self, login: impl Into<String>, passcode: impl Into<String>) -> Self {
        self.header("login", login).header("passcode", passcode)
    }

    /// Add a CONNECT header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.connect_headers.push((name.into(), value.into()));
        self
    }

    /// Default: 5 seconds.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Default: 10.
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Default: 4 seconds both ways. Zero disables a direction.
    pub fn heart_beat(mut self, heart_beat: HeartBeat) -> Self {
        self.config.heart_beat = heart_beat;
        self
    }

    /// Default: 10 seconds.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    /// Validate the broker URL and build the configuration.
    pub fn build(self) -> Result<ConnectionConfig> {
        let url = url::Url::parse(&self.config.broker_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(RideError::InvalidArgument(format!(
                "broker URL must use ws:// or wss://, got {}",
                url.scheme()
            )));
        }
        let host = match self.host {
            Some(host) => host,
            None => url.host_str().unwrap_or("localhost").to_owned(),
        };
        Ok(ConnectionConfig {
            host,
            ..self.config
        })
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Shared {
    config: ConnectionConfig,
    registry: SubscriptionRegistry,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    attempts: AtomicU32,
    /// Present only while a session is open.
    outbound: Mutex<Option<Outbound>>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(from = ?*current, to = ?state, "connection state");
            *current = state;
            true
        });
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn outbound(&self) -> Option<Outbound> {
        lock(&self.outbound).clone()
    }
}

struct Session {
    ws: WsStream,
    heart_beat: HeartBeat,
}

enum SessionEnd {
    Cancelled,
    Lost(RideError),
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// Owner of the single broker connection and its subscriptions.
///
/// Construct one per process and share it by reference or `Arc`. All methods
/// take `&self`.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    task: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("broker_url", &self.shared.config.broker_url)
            .field("state", &self.state())
            .field("topics", &self.shared.registry.len())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                config,
                registry: SubscriptionRegistry::new(),
                state,
                events,
                attempts: AtomicU32::new(0),
                outbound: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Tri-state indicator for display.
    pub fn indicator(&self) -> ConnectionIndicator {
        self.state().indicator()
    }

    /// Watch state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Receive lifecycle events emitted after this call.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Reconnect attempts since the last successful handshake.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.shared.registry
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open the connection and wait for the STOMP session.
    ///
    /// Idempotent. When already open this yields once, re-emits
    /// [`ConnectionEvent::Ready`] and returns. When a session task is already
    /// running (e.g. between reconnect attempts) this waits for it to open or
    /// fail.
    ///
    /// If the first attempt fails its error is returned, but the background
    /// task keeps retrying; watch [`events`](Self::events) for the outcome.
    pub async fn connect(&self) -> Result<()> {
        if self.state() == ConnectionState::Open {
            tokio::task::yield_now().await;
            self.shared.emit(ConnectionEvent::Ready);
            return Ok(());
        }

        let first = {
            let mut task = lock(&self.task);
            let running = task.as_ref().is_some_and(|(handle, _)| !handle.is_finished());
            if running {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                let cancel = CancellationToken::new();
                self.shared.attempts.store(0, Ordering::SeqCst);
                self.shared.set_state(ConnectionState::Connecting);
                let handle = tokio::spawn(run(self.shared.clone(), cancel.clone(), tx));
                *task = Some((handle, cancel));
                Some(rx)
            }
        };

        match first {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(RideError::Transport("session task ended".into()))),
            None => {
                let mut state = self.state_changes();
                let reached = state
                    .wait_for(|s| {
                        matches!(
                            s,
                            ConnectionState::Open | ConnectionState::Failed | ConnectionState::Closed
                        )
                    })
                    .await
                    .map(|s| *s)
                    .unwrap_or(ConnectionState::Closed);
                match reached {
                    ConnectionState::Open => Ok(()),
                    ConnectionState::Failed => Err(RideError::ReconnectExhausted(
                        self.shared.config.max_reconnect_attempts,
                    )),
                    _ => Err(RideError::NotConnected),
                }
            }
        }
    }

    /// Close the connection and release every subscription.
    ///
    /// Stops any pending reconnect and resets the attempt counter.
    pub async fn disconnect(&self) {
        let task = lock(&self.task).take();
        if let Some((handle, cancel)) = task {
            self.shared.set_state(ConnectionState::Closing);
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "session task did not shut down cleanly");
            }
        }
        *lock(&self.shared.outbound) = None;
        self.shared.registry.clear();
        self.shared.attempts.store(0, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Closed);
        self.shared.emit(ConnectionEvent::Closed);
        tracing::info!("disconnected from broker");
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Subscribe to `topic`, returning a stream of its messages.
    ///
    /// Returns `None` (and logs) when the connection is not open.
    pub fn subscribe(&self, topic: &str) -> Option<SubscriptionHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe_with(topic, tx)?;
        Some(SubscriptionHandle::new(topic, id, rx))
    }

    /// Subscribe to `topic`, delivering into an existing channel.
    ///
    /// Lets one consumer multiplex several topics. Returns the subscription id.
    pub fn subscribe_with(
        &self,
        topic: &str,
        handler: mpsc::UnboundedSender<TopicMessage>,
    ) -> Option<String> {
        let state = self.state();
        let outbound = match (state, self.shared.outbound()) {
            (ConnectionState::Open, Some(outbound)) => outbound,
            _ => {
                tracing::warn!(topic, ?state, "cannot subscribe: connection is not open");
                return None;
            }
        };
        match self.shared.registry.subscribe(&outbound, topic, handler) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(topic, error = %e, "subscribe failed");
                None
            }
        }
    }

    /// Stop delivery for `topic`. No-op if it is not subscribed.
    pub fn unsubscribe(&self, topic: &str) {
        let outbound = self.shared.outbound();
        self.shared.registry.unsubscribe(outbound.as_ref(), topic);
    }

    pub fn subscribe_to_room(&self, room_id: &str) -> Option<SubscriptionHandle> {
        self.subscribe(&topics::room_messages(room_id))
    }

    pub fn unsubscribe_from_room(&self, room_id: &str) {
        self.unsubscribe(&topics::room_messages(room_id));
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Send `payload` as JSON to `destination`.
    pub fn publish<T: Serialize>(&self, destination: &str, payload: &T) -> Result<()> {
        if self.state() != ConnectionState::Open {
            return Err(RideError::NotConnected);
        }
        let outbound = self.shared.outbound().ok_or(RideError::NotConnected)?;
        let body = serde_json::to_string(payload)?;
        outbound.send_frame(&Frame::send_json(destination, body))?;
        tracing::debug!(destination, "published");
        Ok(())
    }

    /// Publish a driver's accept / reject decision.
    pub fn send_ride_response(&self, response: &RideResponseMessage) -> Result<()> {
        self.publish(topics::DRIVER_RIDE_RESPONSE, response)
    }

    /// Publish a chat message.
    pub fn send_chat_message(&self, message: &ChatMessage) -> Result<()> {
        self.publish(topics::SEND_MESSAGE, message)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some((handle, cancel)) = lock(&self.task).take() {
            cancel.cancel();
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

async fn run(shared: Arc<Shared>, cancel: CancellationToken, first: oneshot::Sender<Result<()>>) {
    let mut first = Some(first);

    loop {
        shared.set_state(ConnectionState::Connecting);

        let established = tokio::select! {
            _ = cancel.cancelled() => return,
            result = establish(&shared.config) => result,
        };

        match established {
            Ok(session) => {
                let (outbound, outbound_rx) = Outbound::channel();
                if let Err(e) = shared.registry.resubscribe_all(&outbound) {
                    tracing::warn!(error = %e, "failed to queue resubscriptions");
                }
                *lock(&shared.outbound) = Some(outbound.clone());
                shared.attempts.store(0, Ordering::SeqCst);
                shared.set_state(ConnectionState::Open);
                shared.emit(ConnectionEvent::Ready);
                tracing::info!(
                    url = %shared.config.broker_url,
                    heart_beat = %session.heart_beat.header_value(),
                    "broker session open"
                );
                if let Some(tx) = first.take() {
                    let _ = tx.send(Ok(()));
                }

                let end = pump(&shared, session, &outbound, outbound_rx, &cancel).await;
                *lock(&shared.outbound) = None;

                match end {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Lost(e) => {
                        tracing::warn!(error = %e, "broker session lost");
                        shared.emit(ConnectionEvent::Error(e.to_string()));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url = %shared.config.broker_url, error = %e, "broker connect failed");
                shared.emit(ConnectionEvent::Error(e.to_string()));
                // A broker that refuses the handshake will keep refusing it.
                let rejected = matches!(e, RideError::Protocol(_));
                if let Some(tx) = first.take() {
                    let _ = tx.send(Err(e));
                }
                if rejected {
                    let attempts = shared.attempts.load(Ordering::SeqCst);
                    tracing::error!(attempts, "broker rejected the handshake; not retrying");
                    shared.set_state(ConnectionState::Failed);
                    shared.emit(ConnectionEvent::Failed { attempts });
                    return;
                }
            }
        }

        let attempt = shared.attempts.load(Ordering::SeqCst) + 1;
        if attempt > shared.config.max_reconnect_attempts {
            let attempts = attempt - 1;
            tracing::error!(attempts, "reconnect attempts exhausted");
            shared.set_state(ConnectionState::Failed);
            shared.emit(ConnectionEvent::Failed { attempts });
            return;
        }
        shared.attempts.store(attempt, Ordering::SeqCst);
        shared.set_state(ConnectionState::Connecting);
        shared.emit(ConnectionEvent::Reconnecting { attempt });
        tracing::info!(
            attempt,
            delay_ms = shared.config.reconnect_delay.as_millis() as u64,
            "reconnecting"
        );

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(shared.config.reconnect_delay) => {}
        }
    }
}

/// Open the socket and complete the STOMP handshake within the configured
/// timeout.
async fn establish(config: &ConnectionConfig) -> Result<Session> {
    tokio::time::timeout(config.handshake_timeout, handshake(config))
        .await
        .map_err(|_| RideError::HandshakeTimeout(config.handshake_timeout))?
}

async fn handshake(config: &ConnectionConfig) -> Result<Session> {
    let (mut ws, _resp) = connect_async(config.broker_url.as_str()).await?;

    let mut connect = Frame::connect(&config.host, config.heart_beat);
    for (name, value) in &config.connect_headers {
        connect = connect.header(name.as_str(), value.as_str());
    }
    ws.send(Message::Text(connect.encode().into())).await?;

    loop {
        let message = ws
            .next()
            .await
            .ok_or_else(|| RideError::Transport("socket closed during handshake".into()))??;
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => {
                return Err(RideError::Transport("socket closed during handshake".into()));
            }
            _ => continue,
        };
        for frame in parse_frames(&text)? {
            match frame.command {
                Command::Connected => {
                    let server = frame
                        .get("heart-beat")
                        .and_then(HeartBeat::parse)
                        .unwrap_or_default();
                    return Ok(Session {
                        ws,
                        heart_beat: HeartBeat::negotiate(config.heart_beat, server),
                    });
                }
                Command::Error => {
                    let reason = frame.get("message").unwrap_or(frame.body.as_str());
                    return Err(RideError::Protocol(reason.to_owned()));
                }
                other => tracing::debug!(command = %other, "ignoring frame before CONNECTED"),
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick_opt(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Drive an open session until it is cancelled or lost.
async fn pump(
    shared: &Shared,
    session: Session,
    outbound: &Outbound,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut write, mut read) = session.ws.split();
    let hb = session.heart_beat;

    let mut send_tick = (!hb.outgoing.is_zero()).then(|| {
        let mut interval = tokio::time::interval_at(Instant::now() + hb.outgoing, hb.outgoing);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });
    let silence_limit = (!hb.incoming.is_zero()).then(|| hb.incoming * 2);
    let mut last_inbound = Instant::now();

    loop {
        let silence_deadline = silence_limit.map(|limit| last_inbound + limit);

        tokio::select! {
            _ = cancel.cancelled() => {
                let goodbye = Frame::disconnect("disconnect-0").encode();
                if let Err(e) = write.send(Message::Text(goodbye.into())).await {
                    tracing::debug!(error = %e, "DISCONNECT not sent");
                }
                let _ = write.close().await;
                return SessionEnd::Cancelled;
            }

            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    last_inbound = Instant::now();
                    if let Err(e) = handle_text(shared, outbound, &text) {
                        return SessionEnd::Lost(e);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = match frame {
                        Some(frame) if !frame.reason.is_empty() => {
                            format!("closed by broker: {}", frame.reason.as_str())
                        }
                        _ => "closed by broker".to_owned(),
                    };
                    return SessionEnd::Lost(RideError::Transport(reason));
                }
                Some(Ok(_)) => last_inbound = Instant::now(),
                Some(Err(e)) => return SessionEnd::Lost(e.into()),
                None => return SessionEnd::Lost(RideError::Transport("stream ended".into())),
            },

            queued = outbound_rx.recv() => {
                let Some(message) = queued else {
                    return SessionEnd::Lost(RideError::Transport("outbound channel closed".into()));
                };
                if let Err(e) = write.send(message).await {
                    return SessionEnd::Lost(e.into());
                }
            }

            _ = tick_opt(send_tick.as_mut()) => {
                if let Err(e) = outbound.send_heartbeat() {
                    return SessionEnd::Lost(e);
                }
            }

            _ = sleep_until_opt(silence_deadline) => {
                return SessionEnd::Lost(RideError::Transport(format!(
                    "no broker traffic for {:?}",
                    silence_limit.unwrap_or_default()
                )));
            }
        }
    }
}

/// Route the frames of one inbound text message.
///
/// An ERROR frame ends the session; undecodable frames are logged and
/// skipped without losing their neighbours.
fn handle_text(shared: &Shared, outbound: &Outbound, text: &str) -> Result<()> {
    let (frames, errors) = parse_frames_lossy(text);
    for e in errors {
        tracing::warn!(error = %e, "dropping undecodable broker frame");
    }
    for frame in frames {
        match frame.command {
            Command::Message => {
                shared.registry.dispatch(&frame, Some(outbound));
            }
            Command::Receipt => {
                tracing::debug!(receipt = frame.get("receipt-id").unwrap_or_default(), "receipt");
            }
            Command::Error => {
                let reason = frame.get("message").unwrap_or(frame.body.as_str()).to_owned();
                tracing::error!(%reason, "broker sent ERROR");
                return Err(RideError::Protocol(reason));
            }
            other => tracing::debug!(command = %other, "unexpected frame"),
        }
    }
    Ok(())
}
