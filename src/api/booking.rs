//! Booking retrieval endpoints.

use crate::client::BookingClient;
use crate::error::Result;
use crate::types::booking::Booking;

impl BookingClient {
    /// Retrieve a booking by its id.
    ///
    /// **Endpoint:** `GET /booking/{booking-id}`
    pub async fn get_booking_by_id(&self, booking_id: i64) -> Result<Booking> {
        self.get(&format!("/booking/{booking_id}")).await
    }

    /// Retrieve a booking with embedded driver and vehicle details.
    ///
    /// **Endpoint:** `GET /booking/{booking-id}/details`
    pub async fn get_booking_details(&self, booking_id: i64) -> Result<Booking> {
        self.get(&format!("/booking/{booking_id}/details")).await
    }
}
