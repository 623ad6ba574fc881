//! Driver side: receiving dispatch offers and answering them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::constants::topics;
use crate::error::{RideError, Result};
use crate::types::enums::RideAction;
use crate::types::messages::{ExpiryUnit, RideOffer, RideResponseMessage};
use crate::ws::connection::ConnectionManager;
use crate::ws::decoder::MessageDecoder;
use crate::ws::registry::SubscriptionHandle;

/// A driver's subscription to `/topic/driver/{driverId}/ride-requests`.
///
/// Dropping the inbox unsubscribes.
#[derive(Debug)]
pub struct DriverInbox {
    connection: Arc<ConnectionManager>,
    driver_id: String,
    expiry_unit: ExpiryUnit,
    handle: SubscriptionHandle,
    decoder: MessageDecoder,
}

impl DriverInbox {
    /// Subscribe to offers for `driver_id`. Fails with `NotConnected` unless
    /// the connection is open.
    pub fn open(connection: Arc<ConnectionManager>, driver_id: impl Into<String>) -> Result<Self> {
        let driver_id = driver_id.into();
        let topic = topics::driver_ride_requests(&driver_id);
        let handle = connection.subscribe(&topic).ok_or(RideError::NotConnected)?;
        tracing::info!(%driver_id, "listening for ride offers");
        Ok(Self {
            connection,
            driver_id,
            expiry_unit: ExpiryUnit::default(),
            handle,
            decoder: MessageDecoder::new(),
        })
    }

    /// Unit the backend uses for `expiresAt`. Default: milliseconds.
    pub fn with_expiry_unit(mut self, unit: ExpiryUnit) -> Self {
        self.expiry_unit = unit;
        self
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    /// Wait for the next offer. Undecodable payloads are logged and skipped.
    ///
    /// Returns `None` once the subscription is released.
    pub async fn next_offer(&mut self) -> Option<RideOffer> {
        while let Some(message) = self.handle.recv().await {
            match self.decoder.decode_offer(&message.body) {
                Ok(offer) => return Some(offer),
                Err(e) => tracing::warn!(driver_id = %self.driver_id, error = %e, "skipping ride offer"),
            }
        }
        None
    }

    /// Time left to answer `offer`, if it carries an expiry.
    pub fn remaining(&self, offer: &RideOffer) -> Option<Duration> {
        offer.remaining(self.expiry_unit, Utc::now())
    }

    pub fn accept(&self, offer: &RideOffer) -> Result<()> {
        self.respond(offer, RideAction::Accept, None)
    }

    pub fn reject(&self, offer: &RideOffer) -> Result<()> {
        self.respond(offer, RideAction::Reject, None)
    }

    /// Publish the driver's decision on `offer` to `/app/driver/ride-response`.
    ///
    /// Accepting an offer whose expiry has passed is refused locally.
    pub fn respond(&self, offer: &RideOffer, action: RideAction, message: Option<String>) -> Result<()> {
        if offer.request_key().is_none() {
            return Err(RideError::InvalidArgument(
                "ride offer carries neither requestId nor bookingId".into(),
            ));
        }
        if action == RideAction::Accept && self.remaining(offer) == Some(Duration::ZERO) {
            return Err(RideError::InvalidArgument("ride offer has expired".into()));
        }
        let response = RideResponseMessage {
            request_id: offer.request_id.clone(),
            booking_id: offer.booking_id,
            driver_id: self.driver_id.clone(),
            action,
            message,
        };
        self.connection.send_ride_response(&response)?;
        tracing::info!(
            driver_id = %self.driver_id,
            request = %offer.request_key().unwrap_or_default(),
            ?action,
            "answered ride offer"
        );
        Ok(())
    }
}

impl Drop for DriverInbox {
    fn drop(&mut self) {
        self.connection.unsubscribe(self.handle.topic());
    }
}
