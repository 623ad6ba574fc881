//! Ride lifecycle reconciliation pipeline.
//!
//! - [`backend`] — the REST collaborator seam ([`RideBackend`])
//! - [`reconciler`] — the status state machine ([`RideLifecycleReconciler`])
//! - [`poller`] — fixed-interval status polling ([`PollFallbackScheduler`])
//! - [`dispatcher`] — ordered fan-out to observers ([`Dispatcher`])
//! - [`tracker`] — the per-request event loop tying them together ([`RideTracker`])
//! - [`driver`] — dispatch offers for drivers ([`DriverInbox`])
//! - [`chat`] — chat rooms ([`ChatRoom`])

pub mod backend;
pub mod chat;
pub mod dispatcher;
pub mod driver;
pub mod poller;
pub mod reconciler;
pub mod tracker;

pub use backend::RideBackend;
pub use chat::ChatRoom;
pub use dispatcher::{DispatchEvent, DispatchObserver, Dispatcher};
pub use driver::DriverInbox;
pub use poller::{PollConfig, PollFallbackScheduler, PollHandle, PollUpdate};
pub use reconciler::{Applied, BookingAnomaly, RideLifecycleReconciler, RideRequestState, Transition};
pub use tracker::RideTracker;
