//! Payloads exchanged over the broker.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::enums::RideAction;
use super::ride_request::de_opt_id;

// ---------------------------------------------------------------------------
// Driver side
// ---------------------------------------------------------------------------

/// A dispatch offer pushed to `/topic/driver/{driverId}/ride-requests`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideOffer {
    /// Set when the offer is for an existing booking.
    #[serde(default, deserialize_with = "de_opt_id")]
    pub booking_id: Option<i64>,
    /// Tracking id of the rider's request.
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub pickup_latitude: Option<f64>,
    #[serde(default)]
    pub pickup_longitude: Option<f64>,
    #[serde(default)]
    pub dropoff_latitude: Option<f64>,
    #[serde(default)]
    pub dropoff_longitude: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    /// Raw expiry timestamp. Its unit is part of the upstream contract, see
    /// [`RideOffer::expires_at`].
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Unit of an epoch timestamp on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryUnit {
    Seconds,
    #[default]
    Milliseconds,
}

impl RideOffer {
    /// Absolute expiry of the offer, interpreting `expiresAt` in `unit`.
    ///
    /// The unit is never inferred from the magnitude of the value.
    pub fn expires_at(&self, unit: ExpiryUnit) -> Option<DateTime<Utc>> {
        let raw = self.expires_at?;
        match unit {
            ExpiryUnit::Seconds => Utc.timestamp_opt(raw, 0).single(),
            ExpiryUnit::Milliseconds => Utc.timestamp_millis_opt(raw).single(),
        }
    }

    /// Time left to answer the offer at `now`, saturating at zero.
    pub fn remaining(&self, unit: ExpiryUnit, now: DateTime<Utc>) -> Option<Duration> {
        let expires = self.expires_at(unit)?;
        Some((expires - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Key the backend uses to correlate responses: request id, else booking id.
    pub fn request_key(&self) -> Option<String> {
        self.request_id
            .clone()
            .or_else(|| self.booking_id.map(|id| id.to_string()))
    }
}

/// A driver's decision, published to `/app/driver/ride-response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideResponseMessage {
    pub request_id: Option<String>,
    pub booking_id: Option<i64>,
    pub driver_id: String,
    pub action: RideAction,
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Chat payload published to `/app/messages/send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub content: String,
    pub sender: String,
    pub room_id: String,
}

/// A message received on `/topic/messages/{roomId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    /// Room the message was received in (filled from the topic).
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sender: Option<String>,
}
