//! Topic subscription bookkeeping.
//!
//! The [`SubscriptionRegistry`] owns every active topic subscription of a
//! broker session: the client-generated STOMP subscription id and the channel
//! its frames are delivered to. It survives reconnects, so the connection
//! manager can replay every SUBSCRIBE on a fresh session with
//! [`SubscriptionRegistry::resubscribe_all`].
//!
//! Delivery is message passing: each topic has one
//! `mpsc::UnboundedSender<TopicMessage>`. Subscribing to a topic that is
//! already active swaps the sender in place and keeps the subscription id, so
//! each inbound frame is delivered exactly once.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{RideError, Result};
use crate::ws::stomp::{Command, Frame};

// ---------------------------------------------------------------------------
// Outbound writer
// ---------------------------------------------------------------------------

/// Write side of a broker session.
///
/// Frames are queued on an unbounded channel drained by the session task, so
/// sending never blocks and preserves call order.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Message>,
}

impl Outbound {
    /// Create a writer and the receiver the session task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a STOMP frame.
    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.tx
            .send(Message::Text(frame.encode().into()))
            .map_err(|_| RideError::NotConnected)
    }

    /// Queue a heart-beat (a lone EOL).
    pub fn send_heartbeat(&self) -> Result<()> {
        self.tx
            .send(Message::Text("\n".into()))
            .map_err(|_| RideError::NotConnected)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Delivered messages
// ---------------------------------------------------------------------------

/// A MESSAGE frame routed to a topic subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessage {
    /// The topic the subscription was made for.
    pub topic: String,
    pub subscription_id: String,
    pub message_id: Option<String>,
    /// All frame headers in wire order.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Receiving end of a single-topic subscription.
///
/// Implements [`Stream<Item = TopicMessage>`]. The stream ends when the topic
/// is unsubscribed, re-subscribed with a new handler, or released by
/// `disconnect`. Dropping the handle releases the subscription on the next
/// message for it or the next reconnect, whichever comes first.
#[derive(Debug)]
pub struct SubscriptionHandle {
    topic: String,
    id: String,
    receiver: mpsc::UnboundedReceiver<TopicMessage>,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        topic: impl Into<String>,
        id: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<TopicMessage>,
    ) -> Self {
        Self {
            topic: topic.into(),
            id: id.into(),
            receiver,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The STOMP subscription id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next message.
    pub async fn recv(&mut self) -> Option<TopicMessage> {
        self.receiver.recv().await
    }
}

impl Stream for SubscriptionHandle {
    type Item = TopicMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Entry {
    id: String,
    handler: mpsc::UnboundedSender<TopicMessage>,
}

#[derive(Debug, Default)]
struct Inner {
    by_topic: HashMap<String, Entry>,
    next_id: u64,
}

impl Inner {
    fn topic_for(&self, frame: &Frame) -> Option<&str> {
        if let Some(sub) = frame.get("subscription") {
            if let Some((topic, _)) = self.by_topic.iter().find(|(_, e)| e.id == sub) {
                return Some(topic.as_str());
            }
        }
        let destination = frame.get("destination")?;
        self.by_topic
            .get_key_value(destination)
            .map(|(topic, _)| topic.as_str())
    }
}

/// Active topic subscriptions of one broker connection.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<Inner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `topic` and send SUBSCRIBE through `outbound`.
    ///
    /// If `topic` is already active the handler is replaced and the existing
    /// subscription id is returned; no second SUBSCRIBE is sent.
    pub fn subscribe(
        &self,
        outbound: &Outbound,
        topic: &str,
        handler: mpsc::UnboundedSender<TopicMessage>,
    ) -> Result<String> {
        let mut inner = self.lock();

        if let Some(entry) = inner.by_topic.get_mut(topic) {
            entry.handler = handler;
            tracing::debug!(topic, id = %entry.id, "replaced subscription handler");
            return Ok(entry.id.clone());
        }

        let id = format!("sub-{}", inner.next_id);
        outbound.send_frame(&Frame::subscribe(&id, topic))?;
        inner.next_id += 1;
        inner.by_topic.insert(
            topic.to_owned(),
            Entry {
                id: id.clone(),
                handler,
            },
        );
        tracing::info!(topic, %id, "subscribed");
        Ok(id)
    }

    /// Drop the subscription for `topic`, sending UNSUBSCRIBE if a session is
    /// available. Returns `false` if the topic was not subscribed.
    pub fn unsubscribe(&self, outbound: Option<&Outbound>, topic: &str) -> bool {
        let Some(entry) = self.lock().by_topic.remove(topic) else {
            tracing::debug!(topic, "unsubscribe: no active subscription");
            return false;
        };
        if let Some(outbound) = outbound {
            if let Err(e) = outbound.send_frame(&Frame::unsubscribe(&entry.id)) {
                tracing::debug!(topic, error = %e, "UNSUBSCRIBE not sent");
            }
        }
        tracing::info!(topic, id = %entry.id, "unsubscribed");
        true
    }

    /// Route a MESSAGE frame to its subscriber.
    ///
    /// Returns `false` when no subscription matches or the subscriber has gone
    /// away. A subscription whose handle was dropped is released here, with an
    /// UNSUBSCRIBE through `outbound` when a session is available.
    pub fn dispatch(&self, frame: &Frame, outbound: Option<&Outbound>) -> bool {
        if frame.command != Command::Message {
            return false;
        }
        let mut inner = self.lock();
        let Some(topic) = inner.topic_for(frame).map(str::to_owned) else {
            tracing::debug!(
                destination = frame.get("destination").unwrap_or_default(),
                "message for unknown subscription"
            );
            return false;
        };
        let Some(entry) = inner.by_topic.get(&topic) else {
            return false;
        };

        let message = TopicMessage {
            topic: topic.clone(),
            subscription_id: entry.id.clone(),
            message_id: frame.get("message-id").map(str::to_owned),
            headers: frame.headers.clone(),
            body: frame.body.clone(),
        };
        if entry.handler.send(message).is_ok() {
            return true;
        }

        let Some(stale) = inner.by_topic.remove(&topic) else {
            return false;
        };
        drop(inner);
        if let Some(outbound) = outbound {
            if let Err(e) = outbound.send_frame(&Frame::unsubscribe(&stale.id)) {
                tracing::debug!(topic = topic.as_str(), error = %e, "UNSUBSCRIBE not sent");
            }
        }
        tracing::info!(topic = topic.as_str(), id = %stale.id, "subscriber dropped; released subscription");
        false
    }

    /// Replay SUBSCRIBE for every active topic, keeping the original ids.
    ///
    /// Topics whose handle has been dropped are released instead of replayed.
    pub fn resubscribe_all(&self, outbound: &Outbound) -> Result<usize> {
        let mut inner = self.lock();
        inner.by_topic.retain(|topic, entry| {
            let live = !entry.handler.is_closed();
            if !live {
                tracing::info!(topic = topic.as_str(), id = %entry.id, "subscriber dropped; not resubscribing");
            }
            live
        });
        for (topic, entry) in &inner.by_topic {
            outbound.send_frame(&Frame::subscribe(&entry.id, topic))?;
        }
        if !inner.by_topic.is_empty() {
            tracing::info!(count = inner.by_topic.len(), "resubscribed topics");
        }
        Ok(inner.by_topic.len())
    }

    /// Release every subscription. Their handles' streams end.
    pub fn clear(&self) {
        self.lock().by_topic.clear();
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.lock().by_topic.contains_key(topic)
    }

    /// Subscription id of `topic`, if active.
    pub fn id_of(&self, topic: &str) -> Option<String> {
        self.lock().by_topic.get(topic).map(|e| e.id.clone())
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.lock().by_topic.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.lock().by_topic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_topic.is_empty()
    }
}
