//! Normalized inbound events.
//!
//! Both the push path (broker frames, via the decoder) and the poll path (REST
//! status responses) are turned into an [`InboundEvent`] before they reach the
//! reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{EventKind, RideStatus};
use super::ride_request::{DriverInfo, RideStatusResponse};

/// Where an event came from. Only used for logging; reconciliation treats both
/// sources identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    Push,
    Poll,
    /// The one-shot booking fetch after a confirmation without a booking id.
    Fetch,
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Push => "push",
            Self::Poll => "poll",
            Self::Fetch => "fetch",
        })
    }
}

/// A driver shown on the rider's map.
///
/// Markers are replaced wholesale on every update, never merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverMarker {
    pub driver_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<&DriverInfo> for DriverMarker {
    fn from(info: &DriverInfo) -> Self {
        Self {
            driver_id: info.driver_id.clone(),
            latitude: info.latitude,
            longitude: info.longitude,
            name: info.driver_name.clone(),
        }
    }
}

/// A push or poll event in the shared event vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub kind: EventKind,
    pub request_id: Option<String>,
    pub booking_id: Option<i64>,
    pub status: Option<RideStatus>,
    pub driver_id: Option<String>,
    /// Human-readable text carried by the event.
    pub content: Option<String>,
    /// Full replacement for the nearby-driver set, when the event carries one.
    pub nearby_drivers: Option<Vec<DriverMarker>>,
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    /// An event of `kind` with every optional field unset.
    pub fn new(kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            request_id: None,
            booking_id: None,
            status: None,
            driver_id: None,
            content: None,
            nearby_drivers: None,
            timestamp,
        }
    }

    /// A `StatusUpdate` carrying `status`.
    pub fn status_update(status: RideStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(EventKind::StatusUpdate, timestamp)
        }
    }

    /// Normalize a poll response.
    ///
    /// Unknown statuses (e.g. `NOT_FOUND`) produce a status-less
    /// `StatusUpdate`, which the reconciler treats as a no-op apart from the
    /// message and driver list.
    pub fn from_poll(resp: &RideStatusResponse, timestamp: DateTime<Utc>) -> Self {
        let status = RideStatus::from_wire(&resp.status);
        let kind = match status {
            Some(RideStatus::Confirmed) if resp.booking_id.is_some() => EventKind::BookingConfirmed,
            _ => EventKind::StatusUpdate,
        };
        Self {
            kind,
            request_id: resp.request_id.clone(),
            booking_id: resp.booking_id,
            status,
            driver_id: resp.driver_id.clone(),
            content: resp.message.clone(),
            nearby_drivers: (!resp.nearby_drivers.is_empty())
                .then(|| resp.nearby_drivers.iter().map(DriverMarker::from).collect()),
            timestamp,
        }
    }

    /// Whether this event asserts that the ride is confirmed.
    pub fn is_confirmation(&self) -> bool {
        self.kind == EventKind::BookingConfirmed || self.status == Some(RideStatus::Confirmed)
    }
}
