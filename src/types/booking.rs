//! Booking record types.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::enums::BookingStatus;
use super::ride_request::de_opt_id;

/// A booking as returned by `GET /booking/{id}` and `GET /booking/{id}/details`.
///
/// The details endpoint embeds driver information; the plain endpoint only
/// carries the driver's last known position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(alias = "id", deserialize_with = "de_id")]
    pub booking_id: i64,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub booking_status: Option<BookingStatus>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub driver_id: Option<i64>,
    /// Driver's last known latitude.
    #[serde(default)]
    pub driver_latitude: Option<f64>,
    /// Driver's last known longitude.
    #[serde(default)]
    pub driver_longitude: Option<f64>,
    /// Accepts RFC 3339 text or epoch milliseconds.
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub pickup_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub pickup_latitude: Option<f64>,
    #[serde(default)]
    pub pickup_longitude: Option<f64>,
    #[serde(default)]
    pub dropoff_latitude: Option<f64>,
    #[serde(default)]
    pub dropoff_longitude: Option<f64>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub driver_phone_number: Option<String>,
    #[serde(default)]
    pub driver_vehicle_reg_number: Option<String>,
}

impl Booking {
    /// Driver position, when both coordinates are known.
    pub fn driver_position(&self) -> Option<(f64, f64)> {
        Some((self.driver_latitude?, self.driver_longitude?))
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    de_opt_id(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing booking id"))
}

fn de_opt_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Millis(ms)) => Ok(Utc.timestamp_millis_opt(ms).single()),
        Some(Raw::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}
