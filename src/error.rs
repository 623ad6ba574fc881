//! Error types for the `ridesync-rs` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, RideError>`.
//!
//! [`RideError`] covers:
//! - **API errors** — Structured error responses from the booking service
//! - **HTTP status errors** — Unexpected status codes with response body
//! - **HTTP transport errors** — Network, TLS, timeout failures
//! - **JSON errors** — Serialization / deserialization failures
//! - **WebSocket errors** — Socket-level failures from `tungstenite`
//! - **Transport / protocol errors** — Broker session closed or rejected
//! - **Decode / poll / anomaly errors** — Recovered locally, reported for logging

use std::fmt;

/// Error response returned by the booking REST API.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    /// Application-level error message (e.g. "Ride request not found").
    #[serde(default)]
    pub error_message: Option<String>,
    /// Framework-level error name (e.g. "Bad Request").
    #[serde(default)]
    pub error: Option<String>,
    /// Framework-level detail message.
    #[serde(default)]
    pub message: Option<String>,
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.error.as_deref().unwrap_or("Error"),
            self.error_message
                .as_deref()
                .or(self.message.as_deref())
                .unwrap_or("No message"),
        )
    }
}

/// All possible errors produced by the `ridesync-rs` crate.
#[derive(Debug, thiserror::Error)]
pub enum RideError {
    /// An error response returned by the booking REST API.
    #[error("API error: {0}")]
    Api(ApiErrorBody),

    /// The server returned an unexpected HTTP status code.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: reqwest::StatusCode,
        /// The response body text.
        body: String,
    },

    /// A network or transport-level error from `reqwest`.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to serialize or deserialize JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A WebSocket-level error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The caller provided an invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The broker transport closed or failed underneath an open session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The broker rejected the session (STOMP `ERROR` frame).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The broker did not answer the handshake in time.
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// An inbound frame could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A fallback status poll failed.
    #[error("Poll error: {0}")]
    Poll(String),

    /// An event carried a booking id different from the one already recorded.
    #[error("Conflicting booking id for request {request_id}: have {existing}, got {incoming}")]
    ConflictingBookingId {
        /// The ride request the events belong to.
        request_id: String,
        /// The booking id recorded first.
        existing: i64,
        /// The booking id that was ignored.
        incoming: i64,
    },

    /// An operation needed an open broker session.
    #[error("Not connected to the message broker")]
    NotConnected,

    /// Automatic reconnection gave up.
    #[error("Reconnect attempts exhausted after {0} attempts")]
    ReconnectExhausted(u32),
}

impl RideError {
    /// Whether this error is a socket-level failure that drives reconnection.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::WebSocket(_) | Self::HandshakeTimeout(_)
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RideError>;
