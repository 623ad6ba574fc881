//! Inbound frame decoding.
//!
//! The backend publishes two kinds of payload on the same ride-status topic:
//!
//! - **Structured** JSON events, e.g.
//!   `{"type":"BOOKING_CONFIRMED","requestId":"…","bookingId":42,"status":"CONFIRMED"}`
//! - **Legacy** free text, either raw (`Booking ID: 77 confirmed`), as a JSON
//!   string, or wrapped as `{"content":"…","sender":"booking-service"}`.
//!
//! [`MessageDecoder`] folds both into one [`InboundEvent`]. Decoding never
//! fails: anything unrecognized becomes a `PlainMessage`.
//!
//! # Text rules
//!
//! Applied in order, first match wins:
//!
//! 1. a number preceded by "booking id" → `BookingConfirmed` with that id
//! 2. "confirmed", or a driver having "accepted" → `BookingConfirmed`, no id
//! 3. "found" + "drivers" → `StatusUpdate(DriverFound)`
//! 4. "timeout" / "timed out" / "no nearby" → `StatusUpdate(Timeout)`
//! 5. anything else → `PlainMessage`
//!
//! Negated phrasing ("no driver accepted", "no nearby drivers found") does not
//! count as a confirmation or a found-drivers report.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{RideError, Result};
use crate::types::enums::{EventKind, RideStatus};
use crate::types::event::{DriverMarker, InboundEvent};
use crate::types::messages::{RideOffer, RoomMessage};
use crate::types::ride_request::{DriverInfo, de_opt_id};

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    booking_id: Option<i64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    driver_id: Option<Value>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    nearby_drivers: Option<Vec<DriverInfo>>,
}

fn id_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Text rules
// ---------------------------------------------------------------------------

/// The legacy free-text classification table.
#[derive(Debug, Clone)]
struct TextRules {
    booking_id: Regex,
}

impl TextRules {
    fn new() -> Self {
        Self {
            booking_id: Regex::new(r"(?i)booking\s*id\s*[:#=]?\s*(\d+)")
                .unwrap_or_else(|e| unreachable!("static pattern: {e}")),
        }
    }

    fn classify(&self, text: &str, now: DateTime<Utc>) -> InboundEvent {
        let lower = text.to_lowercase();
        let content = Some(text.to_owned());

        if let Some(id) = self
            .booking_id
            .captures(text)
            .and_then(|caps| caps[1].parse::<i64>().ok())
        {
            return InboundEvent {
                booking_id: Some(id),
                content,
                ..InboundEvent::new(EventKind::BookingConfirmed, now)
            };
        }

        let negated = lower.contains("no driver") || lower.contains("no nearby");

        if !negated
            && (lower.contains("confirmed")
                || (lower.contains("accepted") && lower.contains("driver")))
        {
            return InboundEvent {
                content,
                ..InboundEvent::new(EventKind::BookingConfirmed, now)
            };
        }

        if !negated && lower.contains("found") && lower.contains("drivers") {
            return InboundEvent {
                content,
                ..InboundEvent::status_update(RideStatus::DriverFound, now)
            };
        }

        if lower.contains("timeout") || lower.contains("timed out") || lower.contains("no nearby") {
            return InboundEvent {
                content,
                ..InboundEvent::status_update(RideStatus::Timeout, now)
            };
        }

        InboundEvent {
            content,
            ..InboundEvent::new(EventKind::PlainMessage, now)
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Normalizes raw frame bodies into [`InboundEvent`]s.
///
/// # Example
///
/// ```
/// use ridesync_rs::ws::decoder::MessageDecoder;
/// use ridesync_rs::types::EventKind;
///
/// let decoder = MessageDecoder::new();
/// let event = decoder.decode("Booking ID: 77 confirmed");
/// assert_eq!(event.kind, EventKind::BookingConfirmed);
/// assert_eq!(event.booking_id, Some(77));
/// ```
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    rules: Option<TextRules>,
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDecoder {
    /// Decoder with the legacy text rules enabled.
    pub fn new() -> Self {
        Self {
            rules: Some(TextRules::new()),
        }
    }

    /// Decoder that only understands structured events; all free text becomes
    /// a `PlainMessage`.
    pub fn structured_only() -> Self {
        Self { rules: None }
    }

    /// Decode a frame body, stamping it with the current time.
    pub fn decode(&self, raw: &str) -> InboundEvent {
        self.decode_at(raw, Utc::now())
    }

    /// Decode a frame body, stamping it with `now`.
    pub fn decode_at(&self, raw: &str, now: DateTime<Utc>) -> InboundEvent {
        match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => match serde_json::from_value::<WireEvent>(value) {
                Ok(wire) => self.from_wire(wire, raw, now),
                Err(e) => {
                    tracing::debug!(error = %RideError::Json(e), "unrecognized event object; applying text rules");
                    self.classify_text(raw, now)
                }
            },
            Ok(Value::String(text)) => self.classify_text(&text, now),
            Ok(_) => self.classify_text(raw, now),
            Err(e) => {
                tracing::debug!(error = %RideError::Decode(e.to_string()), "non-JSON frame; applying text rules");
                self.classify_text(raw, now)
            }
        }
    }

    fn classify_text(&self, text: &str, now: DateTime<Utc>) -> InboundEvent {
        match &self.rules {
            Some(rules) => rules.classify(text, now),
            None => InboundEvent {
                content: Some(text.to_owned()),
                ..InboundEvent::new(EventKind::PlainMessage, now)
            },
        }
    }

    fn from_wire(&self, wire: WireEvent, raw: &str, now: DateTime<Utc>) -> InboundEvent {
        let kind = wire.kind.as_deref().and_then(EventKind::from_wire);
        let status = wire.status.as_deref().and_then(RideStatus::from_wire);
        let driver_id = wire.driver_id.and_then(id_string);
        let nearby_drivers = wire
            .nearby_drivers
            .map(|drivers| drivers.iter().map(DriverMarker::from).collect());

        let mut event = match (kind, status) {
            (Some(kind), _) => InboundEvent {
                status,
                content: wire.content,
                ..InboundEvent::new(kind, now)
            },
            (None, Some(status)) => InboundEvent {
                content: wire.content,
                ..InboundEvent::status_update(status, now)
            },
            // Legacy text wrapped in an object by the notification relay.
            (None, None) => match wire.content {
                Some(content) => self.classify_text(&content, now),
                None => InboundEvent {
                    content: Some(raw.to_owned()),
                    ..InboundEvent::new(EventKind::PlainMessage, now)
                },
            },
        };

        event.request_id = wire.request_id;
        event.booking_id = wire.booking_id.or(event.booking_id);
        event.driver_id = driver_id;
        event.nearby_drivers = nearby_drivers;
        event
    }

    /// Decode a dispatch offer from a driver's ride-request topic.
    pub fn decode_offer(&self, raw: &str) -> Result<RideOffer> {
        serde_json::from_str(raw).map_err(|e| RideError::Decode(format!("ride offer: {e}")))
    }

    /// Decode a chat message received in `room_id`.
    ///
    /// Plain-text bodies are accepted as the message content.
    pub fn decode_room_message(&self, room_id: &str, raw: &str) -> RoomMessage {
        let mut message = match serde_json::from_str::<RoomMessage>(raw) {
            Ok(message) => message,
            Err(_) => RoomMessage {
                room_id: String::new(),
                content: raw.to_owned(),
                sender: None,
            },
        };
        message.room_id = room_id.to_owned();
        message
    }
}
