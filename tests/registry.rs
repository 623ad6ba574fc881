//! Topic subscription bookkeeping, independent of a live socket.

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use ridesync_rs::ws::registry::{Outbound, SubscriptionRegistry, TopicMessage};
use ridesync_rs::ws::stomp::{Command, Frame, parse_frames};

fn sent(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Ok(message) = rx.try_recv() {
        let text = message.to_text().expect("text message");
        frames.extend(parse_frames(text).expect("valid frame"));
    }
    frames
}

fn message(subscription: Option<&str>, destination: &str, body: &str) -> Frame {
    let mut frame = Frame::new(Command::Message)
        .header("destination", destination)
        .header("message-id", "m-1");
    if let Some(id) = subscription {
        frame = frame.header("subscription", id);
    }
    frame.with_body(body)
}

#[tokio::test]
async fn test_subscribe_sends_frame_and_assigns_ids() {
    let registry = SubscriptionRegistry::new();
    let (outbound, mut rx) = Outbound::channel();
    let (tx, _handler) = mpsc::unbounded_channel();

    let a = registry.subscribe(&outbound, "/topic/a", tx.clone()).expect("subscribe");
    let b = registry.subscribe(&outbound, "/topic/b", tx).expect("subscribe");
    assert_ne!(a, b);
    assert_eq!(registry.topics(), ["/topic/a", "/topic/b"]);

    let frames = sent(&mut rx);
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.command == Command::Subscribe));
    assert_eq!(frames[0].get("id"), Some(a.as_str()));
}

#[tokio::test]
async fn test_resubscribe_keeps_ids() {
    let registry = SubscriptionRegistry::new();
    let (outbound, mut rx) = Outbound::channel();
    let (tx, _handler) = mpsc::unbounded_channel();
    let id = registry.subscribe(&outbound, "/topic/a", tx).expect("subscribe");
    sent(&mut rx);

    let (fresh, mut fresh_rx) = Outbound::channel();
    assert_eq!(registry.resubscribe_all(&fresh).expect("resubscribe"), 1);
    let frames = sent(&mut fresh_rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].get("id"), Some(id.as_str()));
    assert_eq!(frames[0].get("destination"), Some("/topic/a"));
}

#[tokio::test]
async fn test_dispatch_by_subscription_then_destination() {
    let registry = SubscriptionRegistry::new();
    let (outbound, _rx) = Outbound::channel();
    let (tx, mut handler) = mpsc::unbounded_channel::<TopicMessage>();
    let id = registry.subscribe(&outbound, "/topic/a", tx).expect("subscribe");

    assert!(registry.dispatch(&message(Some(&id), "/somewhere/else", "by id"), None));
    assert!(registry.dispatch(&message(None, "/topic/a", "by destination"), None));
    assert!(!registry.dispatch(&message(Some("sub-99"), "/topic/unknown", "lost"), None));
    assert!(!registry.dispatch(&Frame::new(Command::Receipt), None));

    let first = handler.recv().await.expect("message");
    assert_eq!(first.topic, "/topic/a");
    assert_eq!(first.body, "by id");
    assert_eq!(first.message_id.as_deref(), Some("m-1"));
    assert_eq!(handler.recv().await.expect("message").body, "by destination");
}

#[tokio::test]
async fn test_dropped_handler_is_released_on_dispatch() {
    let registry = SubscriptionRegistry::new();
    let (outbound, mut rx) = Outbound::channel();
    let (tx, handler) = mpsc::unbounded_channel();
    let id = registry.subscribe(&outbound, "/topic/a", tx).expect("subscribe");
    sent(&mut rx);

    drop(handler);
    assert!(!registry.dispatch(&message(Some(&id), "/topic/a", "nobody home"), Some(&outbound)));
    assert!(!registry.contains("/topic/a"));

    let frames = sent(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Unsubscribe);
    assert_eq!(frames[0].get("id"), Some(id.as_str()));
}

#[tokio::test]
async fn test_resubscribe_skips_dropped_handlers() {
    let registry = SubscriptionRegistry::new();
    let (outbound, _rx) = Outbound::channel();
    let (kept_tx, _kept) = mpsc::unbounded_channel();
    let (gone_tx, gone) = mpsc::unbounded_channel();
    registry.subscribe(&outbound, "/topic/kept", kept_tx).expect("subscribe");
    registry.subscribe(&outbound, "/topic/gone", gone_tx).expect("subscribe");
    drop(gone);

    let (fresh, mut fresh_rx) = Outbound::channel();
    assert_eq!(registry.resubscribe_all(&fresh).expect("resubscribe"), 1);
    let frames = sent(&mut fresh_rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].get("destination"), Some("/topic/kept"));
    assert_eq!(registry.topics(), ["/topic/kept"]);
}

#[tokio::test]
async fn test_unsubscribe_and_clear() {
    let registry = SubscriptionRegistry::new();
    let (outbound, mut rx) = Outbound::channel();
    let (tx, _handler) = mpsc::unbounded_channel();
    registry.subscribe(&outbound, "/topic/a", tx.clone()).expect("subscribe");
    registry.subscribe(&outbound, "/topic/b", tx).expect("subscribe");
    sent(&mut rx);

    assert!(registry.unsubscribe(Some(&outbound), "/topic/a"));
    assert!(!registry.unsubscribe(Some(&outbound), "/topic/a"));
    let frames = sent(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Unsubscribe);

    // Without a session the entry is still dropped locally.
    assert!(registry.unsubscribe(None, "/topic/b"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_subscribe_on_closed_outbound_fails() {
    let registry = SubscriptionRegistry::new();
    let (outbound, rx) = Outbound::channel();
    drop(rx);
    assert!(outbound.is_closed());

    let (tx, _handler) = mpsc::unbounded_channel();
    assert!(registry.subscribe(&outbound, "/topic/a", tx).is_err());
    assert!(!registry.contains("/topic/a"));
}
