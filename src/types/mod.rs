//! Request, response and payload types.
//!
//! ## Organization
//!
//! - [`enums`] — Shared enumerations (ride status, event kind, connection state, etc.)
//! - [`ride_request`] — Ride request submission and status poll types
//! - [`booking`] — Booking record returned once a ride is confirmed
//! - [`messages`] — Payloads exchanged over the broker (offers, responses, chat)
//! - [`event`] — The normalized push/poll event vocabulary
//!
//! All enums are re-exported at the module root via `pub use enums::*`.

pub mod booking;
pub mod enums;
pub mod event;
pub mod messages;
pub mod ride_request;

pub use enums::*;
