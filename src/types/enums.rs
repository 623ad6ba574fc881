//! Shared enum types used across the REST and streaming sides.
//!
//! Wire values use `SCREAMING_SNAKE_CASE` (`"DRIVER_FOUND"`, `"ACCEPT"`), but
//! the backend is not consistent about it, so statuses are also parsed
//! leniently through [`RideStatus::from_wire`].

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ride status
// ---------------------------------------------------------------------------

/// Lifecycle status of an outstanding ride request.
///
/// Transitions are monotonic: `Searching → DriverFound → Confirmed` or
/// `Searching/DriverFound → Timeout`. `Confirmed` and `Timeout` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Searching,
    DriverFound,
    Confirmed,
    Timeout,
}

impl RideStatus {
    /// Whether no further transitions are accepted from this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Timeout)
    }

    /// Parse a status as sent by either the push or the poll path.
    ///
    /// Case, `_` and `-` are ignored, so `"DRIVER_FOUND"`, `"DriverFound"` and
    /// `"driver-found"` all parse. Returns `None` for statuses outside the
    /// lifecycle (e.g. `"NOT_FOUND"`).
    pub fn from_wire(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "searching" => Some(Self::Searching),
            "driverfound" => Some(Self::DriverFound),
            "confirmed" => Some(Self::Confirmed),
            "timeout" | "timedout" => Some(Self::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Searching => "SEARCHING",
            Self::DriverFound => "DRIVER_FOUND",
            Self::Confirmed => "CONFIRMED",
            Self::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Inbound event kind
// ---------------------------------------------------------------------------

/// Normalized kind of an inbound push or poll event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    BookingConfirmed,
    DriverAccepted,
    StatusUpdate,
    PlainMessage,
}

impl EventKind {
    /// Map the structured `type` field of a payload.
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "BOOKING_CONFIRMED" => Some(Self::BookingConfirmed),
            "DRIVER_ACCEPTED" => Some(Self::DriverAccepted),
            "STATUS_UPDATE" => Some(Self::StatusUpdate),
            "PLAIN_MESSAGE" | "MESSAGE" => Some(Self::PlainMessage),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Driver decision
// ---------------------------------------------------------------------------

/// A driver's answer to a dispatch offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideAction {
    Accept,
    Reject,
}

// ---------------------------------------------------------------------------
// Booking status
// ---------------------------------------------------------------------------

/// Status of a persisted booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Scheduled,
    Started,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
    OnTheWay,
    /// Any status this client does not know about yet.
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Lifecycle of the single broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    /// Collapse into the tri-state indicator shown to users.
    pub fn indicator(self) -> ConnectionIndicator {
        match self {
            Self::Open => ConnectionIndicator::Connected,
            Self::Connecting => ConnectionIndicator::Connecting,
            Self::Idle | Self::Closing | Self::Closed | Self::Failed => {
                ConnectionIndicator::Disconnected
            }
        }
    }
}

/// User-facing connection indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionIndicator {
    Connected,
    Connecting,
    Disconnected,
}

impl fmt::Display for ConnectionIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connected => "connected",
            Self::Connecting => "connecting",
            Self::Disconnected => "disconnected",
        })
    }
}
