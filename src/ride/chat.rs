//! Chat rooms on `/topic/messages/{roomId}`.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::{RideError, Result};
use crate::ride::dispatcher::{DispatchEvent, Dispatcher};
use crate::types::messages::ChatMessage;
use crate::ws::connection::ConnectionManager;
use crate::ws::decoder::MessageDecoder;

/// A joined chat room.
///
/// Incoming messages are published to the [`Dispatcher`] as
/// [`DispatchEvent::Room`]. Dropping the room leaves it.
#[derive(Debug)]
pub struct ChatRoom {
    connection: Arc<ConnectionManager>,
    room_id: String,
    sender: String,
    forwarder: JoinHandle<()>,
}

impl ChatRoom {
    /// Join `room_id`, sending as `sender`.
    pub fn join(
        connection: Arc<ConnectionManager>,
        dispatcher: Arc<Dispatcher>,
        room_id: impl Into<String>,
        sender: impl Into<String>,
    ) -> Result<Self> {
        let room_id = room_id.into();
        let mut handle = connection
            .subscribe_to_room(&room_id)
            .ok_or(RideError::NotConnected)?;

        let decoder = MessageDecoder::new();
        let room = room_id.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(message) = handle.recv().await {
                let message = decoder.decode_room_message(&room, &message.body);
                dispatcher.publish(DispatchEvent::Room(message));
            }
            tracing::debug!(room_id = %room, "room subscription ended");
        });

        tracing::info!(%room_id, "joined chat room");
        Ok(Self {
            connection,
            room_id,
            sender: sender.into(),
            forwarder,
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Send `content` to the room.
    pub fn send(&self, content: impl Into<String>) -> Result<()> {
        self.connection.send_chat_message(&ChatMessage {
            content: content.into(),
            sender: self.sender.clone(),
            room_id: self.room_id.clone(),
        })
    }
}

impl Drop for ChatRoom {
    fn drop(&mut self) {
        self.connection.unsubscribe_from_room(&self.room_id);
        self.forwarder.abort();
    }
}
