//! Broker connection and real-time message delivery.
//!
//! The dispatch backend pushes notifications through a STOMP broker reached
//! over a WebSocket.
//!
//! ## [`stomp`] — Frame codec
//!
//! STOMP 1.2 frames, header escaping and heart-beat negotiation.
//!
//! ## [`connection`] — Connection manager
//!
//! One shared, explicitly constructed [`ConnectionManager`](connection::ConnectionManager)
//! per process. Performs the handshake, keeps heart-beats flowing, reconnects
//! with a fixed delay up to a ceiling and reports its state on `watch` /
//! `broadcast` channels.
//!
//! ## [`registry`] — Subscriptions
//!
//! Topic → handler bookkeeping that survives reconnects. Each subscription is
//! a [`SubscriptionHandle`](registry::SubscriptionHandle) implementing
//! [`futures_util::Stream`].
//!
//! ## [`decoder`] — Event normalization
//!
//! Turns structured and legacy free-text payloads into one
//! [`InboundEvent`](crate::types::event::InboundEvent) vocabulary.
//!
//! ## Topics
//!
//! - `/topic/user/{requestId}/ride-status` — status pushes to the rider
//! - `/topic/driver/{driverId}/ride-requests` — dispatch offers to a driver
//! - `/topic/messages/{roomId}` — chat

pub mod connection;
pub mod decoder;
pub mod registry;
pub mod stomp;
