//! STOMP frame codec tests.

use std::time::Duration;

use ridesync_rs::ws::stomp::{Command, Frame, HeartBeat, parse_frames, parse_frames_lossy};

// ===================================================================
// Encoding
// ===================================================================

#[test]
fn test_encode_subscribe() {
    let wire = Frame::subscribe("sub-0", "/topic/user/r-1/ride-status").encode();
    assert_eq!(
        wire,
        "SUBSCRIBE\nid:sub-0\ndestination:/topic/user/r-1/ride-status\nack:auto\n\n\0"
    );
}

#[test]
fn test_encode_adds_content_length() {
    let wire = Frame::send_json("/app/chat/room-1/send", r#"{"content":"hi"}"#.into()).encode();
    assert!(wire.starts_with("SEND\n"));
    assert!(wire.contains("content-type:application/json\n"));
    assert!(wire.contains("content-length:16\n"));
    assert!(wire.ends_with("\n\n{\"content\":\"hi\"}\0"));
}

#[test]
fn test_encode_escapes_header_values() {
    let wire = Frame::new(Command::Send)
        .header("destination", "/a:b\nc")
        .encode();
    assert!(wire.contains("destination:/a\\cb\\nc\n"));
}

#[test]
fn test_connect_headers_are_not_escaped() {
    let wire = Frame::connect("broker.local:8080", HeartBeat::symmetric(Duration::from_secs(4))).encode();
    assert!(wire.contains("accept-version:1.2\n"));
    assert!(wire.contains("host:broker.local:8080\n"));
    assert!(wire.contains("heart-beat:4000,4000\n"));
}

// ===================================================================
// Parsing
// ===================================================================

#[test]
fn test_parse_message() {
    let raw = "MESSAGE\ndestination:/topic/user/r-1/ride-status\nsubscription:sub-0\nmessage-id:7\n\n{\"status\":\"CONFIRMED\"}\0";
    let frames = parse_frames(raw).expect("parse");
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame.command, Command::Message);
    assert_eq!(frame.get("subscription"), Some("sub-0"));
    assert_eq!(frame.get("message-id"), Some("7"));
    assert_eq!(frame.body, "{\"status\":\"CONFIRMED\"}");
}

#[test]
fn test_parse_round_trips_escaped_headers() {
    let original = Frame::new(Command::Message)
        .header("destination", "/x:y")
        .header("note", "a\\b\r\nc")
        .with_body("body");
    let frames = parse_frames(&original.encode()).expect("parse");
    assert_eq!(frames[0].get("destination"), Some("/x:y"));
    assert_eq!(frames[0].get("note"), Some("a\\b\r\nc"));
    assert_eq!(frames[0].body, "body");
}

#[test]
fn test_parse_content_length_body_may_contain_nul() {
    let raw = "MESSAGE\ncontent-length:5\n\na\0b\0c\0";
    let frames = parse_frames(raw).expect("parse");
    assert_eq!(frames[0].body, "a\0b\0c");
}

#[test]
fn test_parse_crlf_line_endings() {
    let raw = "CONNECTED\r\nversion:1.2\r\nheart-beat:0,0\r\n\r\n\0";
    let frames = parse_frames(raw).expect("parse");
    assert_eq!(frames[0].command, Command::Connected);
    assert_eq!(frames[0].get("version"), Some("1.2"));
    assert_eq!(frames[0].get("heart-beat"), Some("0,0"));
}

#[test]
fn test_parse_multiple_frames_and_heartbeats() {
    let raw = "\nMESSAGE\nsubscription:sub-0\n\none\0\n\nMESSAGE\nsubscription:sub-1\n\ntwo\0\n";
    let frames = parse_frames(raw).expect("parse");
    let bodies: Vec<_> = frames.iter().map(|f| f.body.as_str()).collect();
    assert_eq!(bodies, ["one", "two"]);
}

#[test]
fn test_parse_pure_heartbeat() {
    assert!(parse_frames("\n").expect("parse").is_empty());
    assert!(parse_frames("\r\n").expect("parse").is_empty());
}

#[test]
fn test_first_repeated_header_wins() {
    let raw = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
    let frames = parse_frames(raw).expect("parse");
    assert_eq!(frames[0].get("foo"), Some("first"));
}

#[test]
fn test_parse_rejects_malformed_frames() {
    assert!(parse_frames("BOGUS\n\n\0").is_err());
    assert!(parse_frames("MESSAGE\nno-terminator").is_err());
    assert!(parse_frames("MESSAGE\n\nbody without nul").is_err());
    assert!(parse_frames("MESSAGE\ncontent-length:99\n\nshort\0").is_err());
    assert!(parse_frames("MESSAGE\nbad\\xescape:1\n\n\0").is_err());
}

#[test]
fn test_lossy_parse_keeps_frames_around_a_bad_one() {
    let raw = "MESSAGE\ndestination:/a\n\none\0\nGARBAGE\n\n\0MESSAGE\ndestination:/b\n\ntwo\0";
    let (frames, errors) = parse_frames_lossy(raw);
    assert_eq!(errors.len(), 1);
    let bodies: Vec<_> = frames.iter().map(|f| f.body.as_str()).collect();
    assert_eq!(bodies, ["one", "two"]);
    assert_eq!(frames[1].get("destination"), Some("/b"));
}

#[test]
fn test_lossy_parse_stops_at_unterminated_tail() {
    let (frames, errors) = parse_frames_lossy("MESSAGE\n\nok\0BOGUS\n\nno nul");
    assert_eq!(frames.len(), 1);
    assert_eq!(errors.len(), 1);
}

// ===================================================================
// Heart-beat negotiation
// ===================================================================

#[test]
fn test_heartbeat_parse() {
    let hb = HeartBeat::parse("4000, 10000").expect("parse");
    assert_eq!(hb.outgoing, Duration::from_millis(4000));
    assert_eq!(hb.incoming, Duration::from_millis(10000));
    assert!(HeartBeat::parse("oops").is_none());
    assert_eq!(hb.header_value(), "4000,10000");
}

#[test]
fn test_heartbeat_negotiation_takes_larger_interval() {
    let client = HeartBeat::symmetric(Duration::from_millis(4000));
    let server = HeartBeat::parse("10000,2000").expect("parse");
    let agreed = HeartBeat::negotiate(client, server);
    assert_eq!(agreed.outgoing, Duration::from_millis(4000));
    assert_eq!(agreed.incoming, Duration::from_millis(10000));
}

#[test]
fn test_heartbeat_zero_disables_direction() {
    let client = HeartBeat::symmetric(Duration::from_millis(4000));
    let agreed = HeartBeat::negotiate(client, HeartBeat::parse("0,0").expect("parse"));
    assert_eq!(agreed, HeartBeat::default());

    let agreed = HeartBeat::negotiate(HeartBeat::default(), HeartBeat::parse("5000,5000").expect("parse"));
    assert!(agreed.outgoing.is_zero());
    assert!(agreed.incoming.is_zero());
}
