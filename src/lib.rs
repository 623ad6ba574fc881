//! # ridesync-rs
//!
//! Real-time ride dispatch notifications with push/poll reconciliation.
//!
//! A rider's ride request is resolved by a backend dispatch pipeline. This
//! crate keeps the client's view of that request consistent even when the push
//! channel misbehaves:
//!
//! - [`ws`] — a resilient STOMP broker connection with topic subscriptions
//!   that survive reconnects, and a decoder for structured and legacy payloads
//! - [`ride`] — a fallback status poller, the ride status state machine, and
//!   the per-request tracker that merges both sources
//! - [`client`] / [`api`] — the booking REST endpoints the pipeline calls
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ridesync_rs::{BookingClient, ConnectionConfig, ConnectionManager};
//! use ridesync_rs::ride::{Dispatcher, DispatchEvent, PollConfig, RideTracker};
//!
//! #[tokio::main]
//! async fn main() -> ridesync_rs::Result<()> {
//!     let connection = Arc::new(ConnectionManager::new(ConnectionConfig::from_env()?));
//!     connection.connect().await?;
//!
//!     let dispatcher = Arc::new(Dispatcher::new());
//!     let mut observer = dispatcher.register();
//!     let _tracker = RideTracker::start(
//!         connection,
//!         BookingClient::from_env()?,
//!         dispatcher,
//!         "b7c1…",
//!         PollConfig::default(),
//!     );
//!
//!     while let Some(DispatchEvent::Ride(t)) = observer.recv().await {
//!         println!("{} -> {}", t.from, t.to);
//!         if t.state.is_terminal() {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod constants;
pub mod error;
pub mod ride;
pub mod types;
pub mod ws;

/// Re-export the REST client at crate root for convenience.
pub use client::BookingClient;
/// Re-export the error type and Result alias.
pub use error::{RideError, Result};
pub use ws::connection::{ConnectionConfig, ConnectionEvent, ConnectionManager};
