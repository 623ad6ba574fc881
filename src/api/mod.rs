//! REST API endpoint implementations.
//!
//! Each sub-module adds high-level `async` methods to
//! [`BookingClient`](crate::client::BookingClient) via `impl` blocks. All
//! methods handle JSON serialization, HTTP transport, and error mapping
//! automatically.
//!
//! These are the narrow request/response collaborators the dispatch pipeline
//! depends on; booking CRUD beyond them lives elsewhere.
//!
//! | Module | Endpoints | Description |
//! |---|---|---|
//! | [`ride_request`] | 2 | Submit a ride request, poll its status |
//! | [`booking`] | 2 | Fetch a confirmed booking, with or without driver details |

pub mod booking;
pub mod ride_request;
