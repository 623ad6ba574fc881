//! Per-request event loop.
//!
//! A [`RideTracker`] owns everything that keeps one ride request up to date:
//! the push subscription to `/topic/user/{requestId}/ride-status`, the poll
//! fallback and the reconciler. All three sources feed one task, which is the
//! only writer of the request's state:
//!
//! ```text
//!  broker push ──┐
//!  status poll ──┼──▶ RideLifecycleReconciler ──▶ Dispatcher ──▶ observers
//!  booking fetch ┘              │
//!                               └──▶ watch<RideRequestState>
//! ```
//!
//! The task ends when the request reaches a terminal status (after the
//! one-shot booking fetch, if one was needed, which is itself time-bounded),
//! when the poll window elapses, or on [`RideTracker::stop`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::{timing, topics};
use crate::error::{RideError, Result};
use crate::ride::backend::RideBackend;
use crate::ride::dispatcher::{DispatchEvent, Dispatcher};
use crate::ride::poller::{PollConfig, PollFallbackScheduler, PollUpdate};
use crate::ride::reconciler::{Applied, RideLifecycleReconciler, RideRequestState};
use crate::types::booking::Booking;
use crate::types::event::{EventSource, InboundEvent};
use crate::types::ride_request::{RideRequestBody, RideStatusResponse};
use crate::ws::connection::{ConnectionEvent, ConnectionManager};
use crate::ws::decoder::MessageDecoder;

/// Result of the one-shot lookup after a confirmation without a booking id.
enum Fetched {
    Status(RideStatusResponse),
    Booking(Booking),
}

/// Handle to a running per-request event loop.
///
/// Dropping the tracker stops it.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use ridesync_rs::client::BookingClient;
/// use ridesync_rs::ride::{Dispatcher, PollConfig, RideTracker};
/// use ridesync_rs::ws::connection::{ConnectionConfig, ConnectionManager};
///
/// # #[tokio::main]
/// # async fn main() -> ridesync_rs::error::Result<()> {
/// let connection = Arc::new(ConnectionManager::new(ConnectionConfig::default()));
/// connection.connect().await?;
/// let dispatcher = Arc::new(Dispatcher::new());
/// let mut observer = dispatcher.register();
///
/// let tracker = RideTracker::start(
///     connection.clone(),
///     BookingClient::new(),
///     dispatcher.clone(),
///     "b7c1…",
///     PollConfig::default(),
/// );
/// while let Some(event) = observer.recv().await {
///     println!("{event:?}");
/// }
/// let final_state = tracker.finished().await;
/// println!("{}", final_state.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RideTracker {
    request_id: String,
    state: watch::Receiver<RideRequestState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<RideRequestState>>,
}

impl RideTracker {
    /// Start tracking an existing request.
    pub fn start<B>(
        connection: Arc<ConnectionManager>,
        backend: B,
        dispatcher: Arc<Dispatcher>,
        request_id: impl Into<String>,
        poll: PollConfig,
    ) -> Self
    where
        B: RideBackend + Clone + 'static,
    {
        Self::spawn(connection, backend, dispatcher, request_id.into(), poll, None)
    }

    /// Submit a ride request, then track it.
    ///
    /// The submission response is applied as the first status.
    pub async fn submit<B>(
        connection: Arc<ConnectionManager>,
        backend: B,
        dispatcher: Arc<Dispatcher>,
        request: &RideRequestBody,
        poll: PollConfig,
    ) -> Result<Self>
    where
        B: RideBackend + Clone + 'static,
    {
        let response = backend.submit(request).await?;
        let request_id = response
            .request_id
            .clone()
            .ok_or_else(|| RideError::Decode("ride request response has no requestId".into()))?;
        tracing::info!(%request_id, status = %response.status, "ride request submitted");
        Ok(Self::spawn(
            connection,
            backend,
            dispatcher,
            request_id,
            poll,
            Some(response),
        ))
    }

    fn spawn<B>(
        connection: Arc<ConnectionManager>,
        backend: B,
        dispatcher: Arc<Dispatcher>,
        request_id: String,
        poll: PollConfig,
        initial: Option<RideStatusResponse>,
    ) -> Self
    where
        B: RideBackend + Clone + 'static,
    {
        let reconciler = RideLifecycleReconciler::new(request_id.clone(), Utc::now());
        let (state_tx, state_rx) = watch::channel(reconciler.state().clone());
        let cancel = CancellationToken::new();

        let ctx = TrackerTask {
            connection,
            backend,
            dispatcher,
            reconciler,
            state: state_tx,
            decoder: MessageDecoder::new(),
            fetch: None,
        };
        let task = tokio::spawn(ctx.run(poll, initial, cancel.clone()));

        Self {
            request_id,
            state: state_rx,
            cancel,
            task: Some(task),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Snapshot of the reconciled state.
    pub fn state(&self) -> RideRequestState {
        self.state.borrow().clone()
    }

    /// Watch the reconciled state.
    pub fn state_changes(&self) -> watch::Receiver<RideRequestState> {
        self.state.clone()
    }

    /// Stop tracking. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the event loop to end and return the final state.
    pub async fn finished(mut self) -> RideRequestState {
        let Some(task) = self.task.take() else {
            return self.state();
        };
        match task.await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(request_id = %self.request_id, error = %e, "tracker task failed");
                self.state()
            }
        }
    }
}

impl Drop for RideTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

struct TrackerTask<B> {
    connection: Arc<ConnectionManager>,
    backend: B,
    dispatcher: Arc<Dispatcher>,
    reconciler: RideLifecycleReconciler,
    state: watch::Sender<RideRequestState>,
    decoder: MessageDecoder,
    /// Pending one-shot booking fetch.
    fetch: Option<mpsc::UnboundedReceiver<Fetched>>,
}

async fn recv_opt<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl<B> TrackerTask<B>
where
    B: RideBackend + Clone + 'static,
{
    async fn run(
        mut self,
        poll_config: PollConfig,
        initial: Option<RideStatusResponse>,
        cancel: CancellationToken,
    ) -> RideRequestState {
        let request_id = self.reconciler.request_id().to_owned();
        let topic = topics::user_ride_status(&request_id);

        let mut connection_events = self.connection.events();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel();
        if self.connection.subscribe_with(&topic, push_tx.clone()).is_none() {
            tracing::info!(%request_id, "push channel unavailable; relying on polling until it opens");
        }

        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        let poll = PollFallbackScheduler::start(self.backend.clone(), &request_id, poll_config, poll_tx);
        let mut poll_rx = Some(poll_rx);

        if let Some(response) = initial {
            let event = InboundEvent::from_poll(&response, Utc::now());
            let applied = self.reconciler.apply(&event, EventSource::Poll);
            self.deliver(applied);
        }

        loop {
            if self.reconciler.state().is_terminal() {
                poll.cancel();
                if self.fetch.is_none() {
                    break;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(%request_id, "tracking stopped");
                    break;
                }

                Some(message) = push_rx.recv() => {
                    let event = self.decoder.decode(&message.body);
                    let applied = self.reconciler.apply(&event, EventSource::Push);
                    self.deliver(applied);
                }

                update = recv_opt(&mut poll_rx) => match update {
                    Some(PollUpdate::Status(response)) => {
                        let event = InboundEvent::from_poll(&response, Utc::now());
                        let applied = self.reconciler.apply(&event, EventSource::Poll);
                        self.deliver(applied);
                    }
                    Some(PollUpdate::WindowElapsed) => {
                        if !self.reconciler.state().is_terminal() {
                            self.dispatcher.publish(DispatchEvent::Expired {
                                request_id: request_id.clone(),
                            });
                            break;
                        }
                    }
                    None => poll_rx = None,
                },

                fetched = recv_opt(&mut self.fetch) => match fetched {
                    Some(Fetched::Status(response)) => {
                        let event = InboundEvent::from_poll(&response, Utc::now());
                        let applied = self.reconciler.apply(&event, EventSource::Fetch);
                        self.deliver(applied);
                    }
                    Some(Fetched::Booking(booking)) => {
                        let applied = self.reconciler.attach_booking(&booking);
                        self.deliver(applied);
                    }
                    None => self.fetch = None,
                },

                Ok(event) = connection_events.recv() => {
                    if event == ConnectionEvent::Ready && !self.connection.registry().contains(&topic) {
                        if self.connection.subscribe_with(&topic, push_tx.clone()).is_some() {
                            tracing::info!(%request_id, "push channel subscribed");
                        }
                    }
                }
            }
        }

        drop(poll);
        self.connection.unsubscribe(&topic);
        self.reconciler.into_state()
    }

    /// Publish the outcome of one reconciler step and start the booking fetch
    /// if it asks for one.
    fn deliver(&mut self, applied: Applied) {
        if let Some(transition) = applied.transition {
            self.state.send_replace(transition.state.clone());
            self.dispatcher.publish(DispatchEvent::Ride(transition));
        }
        if let Some(anomaly) = applied.anomaly {
            self.dispatcher.publish(DispatchEvent::Anomaly(anomaly));
        }
        if applied.fetch_booking && self.fetch.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            let backend = self.backend.clone();
            let request_id = self.reconciler.request_id().to_owned();
            tokio::spawn(fetch_confirmed(backend, request_id, tx));
            self.fetch = Some(rx);
        }
    }
}

/// Look up the booking of a request that was confirmed without a booking id.
///
/// The whole lookup is bounded by [`timing::BOOKING_FETCH_TIMEOUT_MS`]; the
/// tracker ends once this task drops `tx`.
async fn fetch_confirmed<B: RideBackend>(
    backend: B,
    request_id: String,
    tx: mpsc::UnboundedSender<Fetched>,
) {
    let limit = Duration::from_millis(timing::BOOKING_FETCH_TIMEOUT_MS);
    if tokio::time::timeout(limit, lookup(&backend, &request_id, &tx)).await.is_err() {
        tracing::warn!(%request_id, timeout_ms = timing::BOOKING_FETCH_TIMEOUT_MS, "booking lookup timed out");
    }
}

async fn lookup<B: RideBackend>(backend: &B, request_id: &str, tx: &mpsc::UnboundedSender<Fetched>) {
    let status = match backend.fetch_status(request_id).await {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(request_id, error = %e, "booking lookup failed");
            return;
        }
    };
    let booking_id = status.booking_id;
    let _ = tx.send(Fetched::Status(status));

    let Some(booking_id) = booking_id else {
        tracing::warn!(request_id, "confirmed request has no booking id yet");
        return;
    };
    match backend.fetch_booking(booking_id).await {
        Ok(booking) => {
            let _ = tx.send(Fetched::Booking(booking));
        }
        Err(e) => tracing::warn!(request_id, booking_id, error = %e, "booking fetch failed"),
    }
}
