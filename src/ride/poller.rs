//! Fallback status polling.
//!
//! Push delivery is not guaranteed: the broker session may still be
//! negotiating when the backend publishes, or a frame may be dropped. The
//! poller queries the request status on a fixed interval for as long as the
//! request is unresolved, bounding notification latency to one interval.
//!
//! - The first query is issued one interval after [`PollFallbackScheduler::start`].
//! - A terminal status (`CONFIRMED`, `TIMEOUT`) stops the schedule.
//! - Failed queries are logged and the schedule continues.
//! - No query is issued, and none is left running, past the window.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::constants::timing;
use crate::error::RideError;
use crate::ride::backend::RideBackend;
use crate::types::enums::RideStatus;
use crate::types::ride_request::RideStatusResponse;

/// Poll schedule settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between queries. Default: 2 seconds.
    pub interval: Duration,
    /// Lifetime of the schedule. Default: 60 seconds.
    pub max_duration: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(timing::POLL_INTERVAL_MS),
            max_duration: Duration::from_millis(timing::POLL_MAX_DURATION_MS),
        }
    }
}

impl PollConfig {
    /// Intervals below [`timing::MIN_POLL_INTERVAL_MS`] are raised to it.
    pub fn new(interval: Duration, max_duration: Duration) -> Self {
        Self {
            interval,
            max_duration,
        }
        .clamped()
    }

    fn clamped(self) -> Self {
        let floor = Duration::from_millis(timing::MIN_POLL_INTERVAL_MS);
        if self.interval < floor {
            tracing::warn!(
                interval_ms = self.interval.as_millis() as u64,
                floor_ms = timing::MIN_POLL_INTERVAL_MS,
                "poll interval too small; clamped"
            );
        }
        Self {
            interval: self.interval.max(floor),
            ..self
        }
    }
}

/// Output of a poll schedule.
#[derive(Debug, Clone, PartialEq)]
pub enum PollUpdate {
    /// A successful status query.
    Status(RideStatusResponse),
    /// The window closed without a terminal status. Always the last update.
    WindowElapsed,
}

/// Owner of a running poll schedule. Dropping it stops the schedule.
#[derive(Debug)]
pub struct PollHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stop polling. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the schedule to end.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::debug!(error = %e, "poll task aborted");
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Starts cancellable status-poll schedules.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollFallbackScheduler;

impl PollFallbackScheduler {
    /// Poll `request_id` through `backend`, sending results to `updates`.
    ///
    /// The schedule also stops if `updates` is closed.
    pub fn start<B>(
        backend: B,
        request_id: impl Into<String>,
        config: PollConfig,
        updates: mpsc::UnboundedSender<PollUpdate>,
    ) -> PollHandle
    where
        B: RideBackend + 'static,
    {
        let config = config.clamped();
        let cancel = CancellationToken::new();
        let request_id = request_id.into();
        tracing::debug!(
            %request_id,
            interval_ms = config.interval.as_millis() as u64,
            max_duration_ms = config.max_duration.as_millis() as u64,
            "starting status poll"
        );
        let task = tokio::spawn(poll_loop(backend, request_id, config, updates, cancel.clone()));
        PollHandle {
            cancel,
            task: Some(task),
        }
    }
}

async fn poll_loop<B: RideBackend>(
    backend: B,
    request_id: String,
    config: PollConfig,
    updates: mpsc::UnboundedSender<PollUpdate>,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    let deadline = started + config.max_duration;
    let mut ticks = tokio::time::interval_at(started + config.interval, config.interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut queries: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(%request_id, queries, "status poll cancelled");
                return;
            }
            _ = tokio::time::sleep_until(deadline) => break,
            _ = ticks.tick() => {}
        }

        queries += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = tokio::time::timeout_at(deadline, backend.fetch_status(&request_id)) => result,
        };

        match result {
            Err(_) => break,
            Ok(Err(e)) => {
                let e = RideError::Poll(e.to_string());
                tracing::warn!(%request_id, attempt = queries, error = %e, "status poll failed");
            }
            Ok(Ok(response)) => {
                let terminal = RideStatus::from_wire(&response.status).is_some_and(RideStatus::is_terminal);
                tracing::debug!(%request_id, status = %response.status, "polled status");
                if updates.send(PollUpdate::Status(response)).is_err() {
                    return;
                }
                if terminal {
                    tracing::debug!(%request_id, queries, "terminal status; polling stopped");
                    return;
                }
            }
        }
    }

    tracing::info!(%request_id, queries, "poll window elapsed without a terminal status");
    let _ = updates.send(PollUpdate::WindowElapsed);
}
