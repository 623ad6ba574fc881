//! Fan-out of reconciled ride transitions and chat messages.

use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::ride::reconciler::{BookingAnomaly, Transition};
use crate::types::messages::RoomMessage;

/// Something observers are told about.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// A ride request's reconciled state changed.
    Ride(Transition),
    /// A chat message arrived in a joined room.
    Room(RoomMessage),
    /// The poll window closed before the request resolved.
    Expired { request_id: String },
    /// Conflicting booking ids were reported for a request.
    Anomaly(BookingAnomaly),
}

/// Delivers every published [`DispatchEvent`] to every registered observer.
///
/// Each observer has its own unbounded queue, so events are never dropped,
/// batched or reordered, and a slow observer does not hold up the others.
#[derive(Debug, Default)]
pub struct Dispatcher {
    observers: Mutex<Vec<mpsc::UnboundedSender<DispatchEvent>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. It receives events published from now on.
    pub fn register(&self) -> DispatchObserver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        DispatchObserver { receiver: rx }
    }

    /// Deliver `event` to all live observers, returning how many received it.
    ///
    /// Observers whose receiver was dropped are forgotten.
    pub fn publish(&self, event: DispatchEvent) -> usize {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|tx| tx.send(event.clone()).is_ok());
        observers.len()
    }

    pub fn observer_count(&self) -> usize {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|tx| !tx.is_closed());
        observers.len()
    }
}

/// Receiving side of a [`Dispatcher`] registration.
///
/// Implements [`Stream<Item = DispatchEvent>`].
#[derive(Debug)]
pub struct DispatchObserver {
    receiver: mpsc::UnboundedReceiver<DispatchEvent>,
}

impl DispatchObserver {
    pub async fn recv(&mut self) -> Option<DispatchEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<DispatchEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for DispatchObserver {
    type Item = DispatchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
