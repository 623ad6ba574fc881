//! Driver offers, chat rooms and observer fan-out.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use serde_json::{Value, json};

use common::StubBroker;
use ridesync_rs::error::RideError;
use ridesync_rs::ride::{
    BookingAnomaly, ChatRoom, DispatchEvent, Dispatcher, DriverInbox, RideRequestState, Transition,
};
use ridesync_rs::types::RideStatus;
use ridesync_rs::types::event::EventSource;
use ridesync_rs::types::messages::{ExpiryUnit, RideOffer, RoomMessage};
use ridesync_rs::ws::stomp::Command;
use ridesync_rs::{ConnectionConfig, ConnectionManager};

async fn online(broker: &StubBroker) -> Arc<ConnectionManager> {
    let config = ConnectionConfig::builder()
        .broker_url(broker.url.as_str())
        .build()
        .expect("valid config");
    let manager = Arc::new(ConnectionManager::new(config));
    manager.connect().await.expect("connect");
    manager
}

fn offer(json: Value) -> RideOffer {
    serde_json::from_value(json).expect("valid offer")
}

// ===================================================================
// Offer expiry
// ===================================================================

#[test]
fn test_offer_expiry_units() {
    let offer = offer(json!({"requestId": "r-1", "expiresAt": 1_700_000_030}));
    let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

    assert_eq!(
        offer.expires_at(ExpiryUnit::Seconds),
        Utc.timestamp_opt(1_700_000_030, 0).single()
    );
    assert_eq!(offer.remaining(ExpiryUnit::Seconds, now), Some(Duration::from_secs(30)));

    // Read as milliseconds the same value is in January 1970.
    assert_eq!(offer.remaining(ExpiryUnit::Milliseconds, now), Some(Duration::ZERO));
    assert_eq!(ExpiryUnit::default(), ExpiryUnit::Milliseconds);
}

#[test]
fn test_offer_without_expiry() {
    let offer = offer(json!({"bookingId": 42}));
    assert_eq!(offer.remaining(ExpiryUnit::Milliseconds, Utc::now()), None);
    assert_eq!(offer.request_key().as_deref(), Some("42"));
}

// ===================================================================
// Driver inbox
// ===================================================================

#[tokio::test]
async fn test_driver_receives_and_accepts_offer() {
    let mut broker = StubBroker::start().await;
    let connection = online(&broker).await;

    let mut inbox = DriverInbox::open(connection.clone(), "d-7").expect("inbox");
    assert_eq!(inbox.driver_id(), "d-7");
    let subscribe = broker.expect_frame(Command::Subscribe).await;
    assert_eq!(subscribe.get("destination"), Some("/topic/driver/d-7/ride-requests"));

    let expires = Utc::now().timestamp_millis() + 30_000;
    broker.publish("/topic/driver/d-7/ride-requests", "not an offer");
    broker.publish(
        "/topic/driver/d-7/ride-requests",
        &json!({"requestId": "r-1", "price": 12.5, "expiresAt": expires}).to_string(),
    );

    let offer = tokio::time::timeout(Duration::from_secs(5), inbox.next_offer())
        .await
        .expect("timed out")
        .expect("offer");
    assert_eq!(offer.request_id.as_deref(), Some("r-1"));
    let remaining = inbox.remaining(&offer).expect("expiry");
    assert!(remaining > Duration::from_secs(25) && remaining <= Duration::from_secs(30));

    inbox.accept(&offer).expect("accept");
    let send = broker.expect_frame(Command::Send).await;
    assert_eq!(send.get("destination"), Some("/app/driver/ride-response"));
    let body: Value = serde_json::from_str(&send.body).expect("json");
    assert_eq!(body["requestId"], "r-1");
    assert_eq!(body["driverId"], "d-7");
    assert_eq!(body["action"], "ACCEPT");

    drop(inbox);
    broker.expect_frame(Command::Unsubscribe).await;
    assert!(connection.registry().is_empty());
}

#[tokio::test]
async fn test_expired_offer_cannot_be_accepted() {
    let broker = StubBroker::start().await;
    let connection = online(&broker).await;
    let inbox = DriverInbox::open(connection, "d-7").expect("inbox");

    let stale = offer(json!({
        "requestId": "r-1",
        "expiresAt": Utc::now().timestamp_millis() - 1_000
    }));
    assert!(matches!(inbox.accept(&stale), Err(RideError::InvalidArgument(_))));
    inbox.reject(&stale).expect("rejecting is still allowed");

    let anonymous = offer(json!({"price": 3.0}));
    assert!(matches!(inbox.reject(&anonymous), Err(RideError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_expiry_unit_is_configurable() {
    let broker = StubBroker::start().await;
    let connection = online(&broker).await;
    let inbox = DriverInbox::open(connection, "d-7")
        .expect("inbox")
        .with_expiry_unit(ExpiryUnit::Seconds);

    let offer = offer(json!({
        "requestId": "r-1",
        "expiresAt": Utc::now().timestamp() + 60
    }));
    assert!(inbox.remaining(&offer).expect("expiry") > Duration::from_secs(50));
    inbox.accept(&offer).expect("accept");
}

#[test]
fn test_inbox_requires_connection() {
    let connection = Arc::new(ConnectionManager::new(ConnectionConfig::default()));
    let err = DriverInbox::open(connection, "d-7").unwrap_err();
    assert!(matches!(err, RideError::NotConnected));
}

// ===================================================================
// Chat rooms
// ===================================================================

#[tokio::test]
async fn test_chat_room_round_trip() {
    let mut broker = StubBroker::start().await;
    let connection = online(&broker).await;
    let dispatcher = Arc::new(Dispatcher::new());
    let mut observer = dispatcher.register();

    let room = ChatRoom::join(connection.clone(), dispatcher, "room-1", "rider-1").expect("join");
    assert_eq!(room.room_id(), "room-1");
    let subscribe = broker.expect_frame(Command::Subscribe).await;
    assert_eq!(subscribe.get("destination"), Some("/topic/messages/room-1"));

    broker.publish("/topic/messages/room-1", r#"{"content":"on my way","sender":"driver-7"}"#);
    let event = tokio::time::timeout(Duration::from_secs(5), observer.next())
        .await
        .expect("timed out")
        .expect("event");
    assert_eq!(
        event,
        DispatchEvent::Room(RoomMessage {
            room_id: "room-1".into(),
            content: "on my way".into(),
            sender: Some("driver-7".into()),
        })
    );

    room.send("see you soon").expect("send");
    let send = broker.expect_frame(Command::Send).await;
    assert_eq!(send.get("destination"), Some("/app/messages/send"));
    let body: Value = serde_json::from_str(&send.body).expect("json");
    assert_eq!(body, json!({"content": "see you soon", "sender": "rider-1", "roomId": "room-1"}));

    drop(room);
    broker.expect_frame(Command::Unsubscribe).await;
}

// ===================================================================
// Dispatcher
// ===================================================================

fn transition(to: RideStatus) -> DispatchEvent {
    let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let mut state = RideRequestState::new("r-1", now);
    state.status = to;
    DispatchEvent::Ride(Transition {
        from: RideStatus::Searching,
        to,
        source: EventSource::Push,
        state,
    })
}

#[tokio::test]
async fn test_dispatcher_preserves_order_for_every_observer() {
    let dispatcher = Dispatcher::new();
    let mut a = dispatcher.register();
    let mut b = dispatcher.register();

    let events = [
        transition(RideStatus::DriverFound),
        DispatchEvent::Anomaly(BookingAnomaly {
            request_id: "r-1".into(),
            existing: 42,
            incoming: 43,
        }),
        transition(RideStatus::Confirmed),
    ];
    for event in &events {
        assert_eq!(dispatcher.publish(event.clone()), 2);
    }

    for observer in [&mut a, &mut b] {
        for expected in &events {
            assert_eq!(observer.recv().await.as_ref(), Some(expected));
        }
        assert!(observer.try_recv().is_none());
    }
}

#[tokio::test]
async fn test_dispatcher_forgets_dropped_observers() {
    let dispatcher = Dispatcher::new();
    let mut kept = dispatcher.register();
    let dropped = dispatcher.register();
    assert_eq!(dispatcher.observer_count(), 2);

    drop(dropped);
    assert_eq!(dispatcher.observer_count(), 1);
    assert_eq!(
        dispatcher.publish(DispatchEvent::Expired {
            request_id: "r-1".into()
        }),
        1
    );
    assert!(matches!(kept.recv().await, Some(DispatchEvent::Expired { .. })));
}

#[tokio::test]
async fn test_late_observer_misses_earlier_events() {
    let dispatcher = Dispatcher::new();
    dispatcher.publish(transition(RideStatus::DriverFound));
    let mut late = dispatcher.register();
    assert!(late.try_recv().is_none());
    dispatcher.publish(transition(RideStatus::Confirmed));
    assert_eq!(late.recv().await, Some(transition(RideStatus::Confirmed)));
}
