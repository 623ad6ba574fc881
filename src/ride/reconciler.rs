//! Ride lifecycle reconciliation.
//!
//! Push events and poll results report the same facts at different times. The
//! [`RideLifecycleReconciler`] folds both through one transition function:
//!
//! ```text
//! Searching ──▶ DriverFound ──▶ Confirmed
//!     │              │
//!     └──────────────┴────────▶ Timeout
//! Searching ─────────────────▶ Confirmed
//! ```
//!
//! - A confirmation wins over any non-terminal status.
//! - `DriverFound` only advances from `Searching`.
//! - `Confirmed` and `Timeout` are sticky.
//! - The first booking id seen is kept; a different one later is an anomaly.
//!
//! The function ignores where an event came from, so duplicated or reordered
//! deliveries across the two sources converge on the same state.

use chrono::{DateTime, Utc};

use crate::error::RideError;
use crate::types::booking::Booking;
use crate::types::enums::RideStatus;
use crate::types::event::{DriverMarker, EventSource, InboundEvent};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Reconciled state of one outstanding ride request.
#[derive(Debug, Clone, PartialEq)]
pub struct RideRequestState {
    pub request_id: String,
    pub status: RideStatus,
    /// Set once, by the first event that carries it.
    pub booking_id: Option<i64>,
    pub driver_id: Option<String>,
    /// The accepting driver, once their position is known.
    pub assigned_driver: Option<DriverMarker>,
    pub nearby_drivers: Vec<DriverMarker>,
    /// Latest human-readable message from the backend.
    pub message: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl RideRequestState {
    /// A freshly submitted request.
    pub fn new(request_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            request_id: request_id.into(),
            status: RideStatus::Searching,
            booking_id: None,
            driver_id: None,
            assigned_driver: None,
            nearby_drivers: Vec::new(),
            message: None,
            last_updated: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A change to a [`RideRequestState`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: RideStatus,
    pub to: RideStatus,
    pub source: EventSource,
    /// The state after the change.
    pub state: RideRequestState,
}

impl Transition {
    /// Whether the status itself moved (as opposed to e.g. a booking id or
    /// driver list update).
    pub fn status_changed(&self) -> bool {
        self.from != self.to
    }
}

/// Two different booking ids reported for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingAnomaly {
    pub request_id: String,
    pub existing: i64,
    pub incoming: i64,
}

impl From<BookingAnomaly> for RideError {
    fn from(a: BookingAnomaly) -> Self {
        RideError::ConflictingBookingId {
            request_id: a.request_id,
            existing: a.existing,
            incoming: a.incoming,
        }
    }
}

/// Outcome of applying one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    /// Present when the state changed.
    pub transition: Option<Transition>,
    /// Present when the event carried a conflicting booking id.
    pub anomaly: Option<BookingAnomaly>,
    /// The request just became confirmed without a booking id; the caller
    /// should fetch the booking once.
    pub fetch_booking: bool,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Sole writer of a [`RideRequestState`].
#[derive(Debug, Clone)]
pub struct RideLifecycleReconciler {
    state: RideRequestState,
}

impl RideLifecycleReconciler {
    pub fn new(request_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            state: RideRequestState::new(request_id, now),
        }
    }

    pub fn state(&self) -> &RideRequestState {
        &self.state
    }

    pub fn request_id(&self) -> &str {
        &self.state.request_id
    }

    pub fn into_state(self) -> RideRequestState {
        self.state
    }

    /// Apply a push or poll event.
    ///
    /// Events addressed to a different request are ignored.
    pub fn apply(&mut self, event: &InboundEvent, source: EventSource) -> Applied {
        if let Some(other) = event.request_id.as_deref() {
            if other != self.state.request_id {
                tracing::debug!(
                    request_id = %self.state.request_id,
                    event_request_id = other,
                    "ignoring event for another request"
                );
                return Applied::default();
            }
        }

        let from = self.state.status;
        let mut applied = Applied::default();
        let mut changed = false;

        if let Some(incoming) = event.booking_id {
            match self.record_booking_id(incoming, source) {
                Ok(set) => changed |= set,
                Err(anomaly) => applied.anomaly = Some(anomaly),
            }
        }

        if !from.is_terminal() {
            if let Some(to) = target_status(from, event) {
                self.state.status = to;
                changed = true;
            }

            if let Some(drivers) = &event.nearby_drivers {
                if *drivers != self.state.nearby_drivers {
                    self.state.nearby_drivers = drivers.clone();
                    changed = true;
                }
            }
            if let Some(driver_id) = &event.driver_id {
                if self.state.driver_id.is_none() {
                    self.state.driver_id = Some(driver_id.clone());
                    changed = true;
                }
            }
            if let Some(content) = &event.content {
                if self.state.message.as_ref() != Some(content) {
                    self.state.message = Some(content.clone());
                    changed = true;
                }
            }
            changed |= self.locate_assigned_driver();
        }

        let to = self.state.status;
        if to == RideStatus::Confirmed && from != RideStatus::Confirmed && self.state.booking_id.is_none() {
            applied.fetch_booking = true;
        }

        if changed {
            self.state.last_updated = event.timestamp;
            if from != to {
                tracing::info!(
                    request_id = %self.state.request_id,
                    %from,
                    %to,
                    %source,
                    booking_id = ?self.state.booking_id,
                    "ride status changed"
                );
            }
            applied.transition = Some(Transition {
                from,
                to,
                source,
                state: self.state.clone(),
            });
        }
        applied
    }

    /// Fold in the booking fetched after a confirmation.
    ///
    /// The booking id follows the same first-writer rule as events; the
    /// driver and their position fill in whatever is still unknown.
    pub fn attach_booking(&mut self, booking: &Booking) -> Applied {
        let status = self.state.status;
        let mut applied = Applied::default();
        let mut changed = false;

        match self.record_booking_id(booking.booking_id, EventSource::Fetch) {
            Ok(set) => changed |= set,
            Err(anomaly) => {
                // Driver details of a different booking do not belong here.
                applied.anomaly = Some(anomaly);
                return applied;
            }
        }

        if self.state.driver_id.is_none() {
            if let Some(id) = booking.driver_id {
                self.state.driver_id = Some(id.to_string());
                changed = true;
            }
        }

        if let (Some(driver_id), Some((latitude, longitude))) =
            (self.state.driver_id.clone(), booking.driver_position())
        {
            let marker = DriverMarker {
                driver_id,
                latitude,
                longitude,
                name: booking.driver_name.clone(),
            };
            if self.state.assigned_driver.as_ref() != Some(&marker) {
                self.state.assigned_driver = Some(marker);
                changed = true;
            }
        }

        if changed {
            self.state.last_updated = Utc::now();
            applied.transition = Some(Transition {
                from: status,
                to: status,
                source: EventSource::Fetch,
                state: self.state.clone(),
            });
        }
        applied
    }

    /// First-writer-wins booking id. `Ok(true)` when the id was recorded now.
    fn record_booking_id(
        &mut self,
        incoming: i64,
        source: EventSource,
    ) -> std::result::Result<bool, BookingAnomaly> {
        match self.state.booking_id {
            None => {
                self.state.booking_id = Some(incoming);
                Ok(true)
            }
            Some(existing) if existing == incoming => Ok(false),
            Some(existing) => {
                let anomaly = BookingAnomaly {
                    request_id: self.state.request_id.clone(),
                    existing,
                    incoming,
                };
                tracing::warn!(
                    error = %RideError::from(anomaly.clone()),
                    %source,
                    "ignoring conflicting booking id"
                );
                Err(anomaly)
            }
        }
    }

    /// Take the assigned driver's position from the nearby set, if present.
    fn locate_assigned_driver(&mut self) -> bool {
        if self.state.assigned_driver.is_some() {
            return false;
        }
        let Some(driver_id) = self.state.driver_id.as_deref() else {
            return false;
        };
        match self.state.nearby_drivers.iter().find(|d| d.driver_id == driver_id) {
            Some(marker) => {
                self.state.assigned_driver = Some(marker.clone());
                true
            }
            None => false,
        }
    }
}

/// Status `event` moves a non-terminal `from` to, if any.
fn target_status(from: RideStatus, event: &InboundEvent) -> Option<RideStatus> {
    let to = if event.is_confirmation() {
        RideStatus::Confirmed
    } else {
        match event.status? {
            RideStatus::DriverFound if from == RideStatus::Searching => RideStatus::DriverFound,
            RideStatus::Timeout => RideStatus::Timeout,
            _ => return None,
        }
    };
    (to != from).then_some(to)
}
