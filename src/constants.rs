//! Constants for the ride dispatch backend.
//!
//! Contains default endpoints, topic / destination names and the timing values
//! used by the connection manager and the poll fallback. These are used
//! internally but are also exported for advanced usage.

// ---------------------------------------------------------------------------
// Base URLs
// ---------------------------------------------------------------------------

/// Default base URL for the booking REST API.
pub const API_BASE_URL: &str = "http://localhost:8002/api/v1";

/// Default raw WebSocket endpoint of the STOMP broker.
///
/// The broker also exposes a SockJS endpoint at `/ws-uber`; the raw socket
/// lives under its `/websocket` suffix.
pub const BROKER_URL: &str = "ws://localhost:8080/ws-uber/websocket";

// ---------------------------------------------------------------------------
// Topics and destinations
// ---------------------------------------------------------------------------

/// Topic and destination names used on the broker.
pub mod topics {
    /// Destination for a driver's accept / reject decision.
    pub const DRIVER_RIDE_RESPONSE: &str = "/app/driver/ride-response";

    /// Destination for chat messages.
    pub const SEND_MESSAGE: &str = "/app/messages/send";

    /// Dispatch offers addressed to one driver.
    pub fn driver_ride_requests(driver_id: &str) -> String {
        format!("/topic/driver/{driver_id}/ride-requests")
    }

    /// Status pushes addressed to the rider that created `request_id`.
    pub fn user_ride_status(request_id: &str) -> String {
        format!("/topic/user/{request_id}/ride-status")
    }

    /// Chat messages for one room.
    pub fn room_messages(room_id: &str) -> String {
        format!("/topic/messages/{room_id}")
    }
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Timing defaults for the transport and the poll fallback.
pub mod timing {
    /// Fixed delay between reconnect attempts (milliseconds).
    pub const RECONNECT_DELAY_MS: u64 = 5_000;
    /// Reconnect attempts before the connection is declared failed.
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;
    /// Heart-beat interval requested in both directions (milliseconds).
    pub const HEARTBEAT_MS: u64 = 4_000;
    /// Upper bound on the STOMP handshake (milliseconds).
    pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
    /// Interval between fallback status polls (milliseconds).
    pub const POLL_INTERVAL_MS: u64 = 2_000;
    /// Maximum lifetime of a fallback poll schedule (milliseconds).
    pub const POLL_MAX_DURATION_MS: u64 = 60_000;
    /// Smallest accepted poll interval (milliseconds).
    pub const MIN_POLL_INTERVAL_MS: u64 = 100;
    /// Upper bound on the one-shot booking lookup after a confirmation
    /// (milliseconds).
    pub const BOOKING_FETCH_TIMEOUT_MS: u64 = 10_000;
}

/// STOMP protocol version negotiated with the broker.
pub const STOMP_VERSION: &str = "1.2";
