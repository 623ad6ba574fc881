//! Ride request submission and status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Request body for `POST /booking/ride-request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequestBody {
    pub user_id: String,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
    /// Requested pickup time (serialized as RFC 3339).
    pub pickup_time: DateTime<Utc>,
}

/// Response of `POST /booking/ride-request` and `GET /booking/ride-request/{id}`.
///
/// The same shape is used for the immediate acknowledgement (status
/// `SEARCHING`) and for every subsequent poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideStatusResponse {
    /// Tracking id assigned by the backend before a booking exists.
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Raw status string (`SEARCHING`, `DRIVER_FOUND`, `CONFIRMED`,
    /// `TIMEOUT`, `NOT_FOUND`). See [`RideStatus::from_wire`](super::RideStatus::from_wire).
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Booking id, present once the request was confirmed.
    #[serde(default, deserialize_with = "de_opt_id")]
    pub booking_id: Option<i64>,
    /// Driver that accepted, when the backend reports it.
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default, deserialize_with = "de_null_as_empty")]
    pub nearby_drivers: Vec<DriverInfo>,
}

/// A driver near the pickup point, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    pub driver_id: String,
    #[serde(default)]
    pub driver_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Distance to the pickup point in kilometres.
    #[serde(default)]
    pub distance: Option<f64>,
}

/// Accept ids sent either as JSON numbers or as numeric strings.
pub(crate) fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Num(i64),
        Str(String),
    }

    Ok(match Option::<Id>::deserialize(deserializer)? {
        Some(Id::Num(n)) => Some(n),
        Some(Id::Str(s)) => s.trim().parse().ok(),
        None => None,
    })
}

pub(crate) fn de_null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
