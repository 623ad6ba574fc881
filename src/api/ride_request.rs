//! Ride request endpoints.

use crate::client::BookingClient;
use crate::error::Result;
use crate::types::ride_request::{RideRequestBody, RideStatusResponse};

impl BookingClient {
    /// Submit a ride request. The backend answers immediately with a
    /// `requestId` and status `SEARCHING`; drivers are searched asynchronously.
    ///
    /// **Endpoint:** `POST /booking/ride-request`
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use ridesync_rs::client::BookingClient;
    /// # use ridesync_rs::types::ride_request::RideRequestBody;
    /// # #[tokio::main]
    /// # async fn main() -> ridesync_rs::error::Result<()> {
    /// let client = BookingClient::new();
    /// let ack = client
    ///     .submit_ride_request(&RideRequestBody {
    ///         user_id: "1".into(),
    ///         pickup_latitude: 40.7128,
    ///         pickup_longitude: -74.0060,
    ///         dropoff_latitude: 40.7306,
    ///         dropoff_longitude: -73.9352,
    ///         pickup_time: chrono::Utc::now(),
    ///     })
    ///     .await?;
    /// println!("tracking {:?}", ack.request_id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit_ride_request(&self, req: &RideRequestBody) -> Result<RideStatusResponse> {
        self.post("/booking/ride-request", req).await
    }

    /// Retrieve the current status of a ride request.
    ///
    /// **Endpoint:** `GET /booking/ride-request/{request-id}`
    pub async fn get_ride_request_status(&self, request_id: &str) -> Result<RideStatusResponse> {
        self.get(&format!("/booking/ride-request/{request_id}")).await
    }
}
