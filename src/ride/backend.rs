//! The REST collaborator seen by the reconciliation pipeline.

use std::future::Future;
use std::sync::Arc;

use crate::client::BookingClient;
use crate::error::Result;
use crate::types::booking::Booking;
use crate::types::ride_request::{RideRequestBody, RideStatusResponse};

/// Status and booking lookups used by the poll fallback and the one-shot
/// booking fetch.
///
/// Implemented by [`BookingClient`]; tests substitute in-memory fakes.
pub trait RideBackend: Send + Sync {
    /// Current status of a ride request.
    fn fetch_status(&self, request_id: &str) -> impl Future<Output = Result<RideStatusResponse>> + Send;

    /// A confirmed booking, including the driver's last known position.
    fn fetch_booking(&self, booking_id: i64) -> impl Future<Output = Result<Booking>> + Send;

    /// Create a ride request.
    fn submit(&self, request: &RideRequestBody) -> impl Future<Output = Result<RideStatusResponse>> + Send;
}

impl RideBackend for BookingClient {
    async fn fetch_status(&self, request_id: &str) -> Result<RideStatusResponse> {
        self.get_ride_request_status(request_id).await
    }

    async fn fetch_booking(&self, booking_id: i64) -> Result<Booking> {
        self.get_booking_by_id(booking_id).await
    }

    async fn submit(&self, request: &RideRequestBody) -> Result<RideStatusResponse> {
        self.submit_ride_request(request).await
    }
}

impl<T: RideBackend> RideBackend for Arc<T> {
    fn fetch_status(&self, request_id: &str) -> impl Future<Output = Result<RideStatusResponse>> + Send {
        (**self).fetch_status(request_id)
    }

    fn fetch_booking(&self, booking_id: i64) -> impl Future<Output = Result<Booking>> + Send {
        (**self).fetch_booking(booking_id)
    }

    fn submit(&self, request: &RideRequestBody) -> impl Future<Output = Result<RideStatusResponse>> + Send {
        (**self).submit(request)
    }
}
