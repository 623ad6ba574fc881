//! STOMP 1.2 frame codec.
//!
//! The broker speaks STOMP over text WebSocket messages. A frame is a command
//! line, `name:value` header lines, a blank line and a body terminated by a
//! NUL octet:
//!
//! ```text
//! MESSAGE
//! destination:/topic/user/abc/ride-status
//! subscription:sub-0
//! message-id:7
//!
//! {"status":"CONFIRMED","bookingId":42}\0
//! ```
//!
//! A WebSocket message made only of end-of-line characters is a heart-beat.
//! One message may carry several frames; [`parse_frames`] returns all of them.

use std::fmt;
use std::time::Duration;

use crate::error::{RideError, Result};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// A STOMP frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // client frames
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// The command as written on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Parse a command line. Commands are case-sensitive.
    pub fn parse(line: &str) -> Option<Self> {
        Some(match line {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            _ => return None,
        })
    }

    /// CONNECT and CONNECTED frames carry headers without escaping.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Heart-beating
// ---------------------------------------------------------------------------

/// A `heart-beat` header value: `outgoing,incoming` in milliseconds.
///
/// A zero duration means "cannot send" / "does not want to receive".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing: Duration,
    pub incoming: Duration,
}

impl HeartBeat {
    /// Same interval in both directions.
    pub fn symmetric(interval: Duration) -> Self {
        Self {
            outgoing: interval,
            incoming: interval,
        }
    }

    /// Parse `"cx,cy"`.
    pub fn parse(value: &str) -> Option<Self> {
        let (out, inc) = value.split_once(',')?;
        Some(Self {
            outgoing: Duration::from_millis(out.trim().parse().ok()?),
            incoming: Duration::from_millis(inc.trim().parse().ok()?),
        })
    }

    pub fn header_value(&self) -> String {
        format!(
            "{},{}",
            self.outgoing.as_millis(),
            self.incoming.as_millis()
        )
    }

    /// Effective intervals from the client's offer and the server's answer.
    ///
    /// The result is from the client's point of view: `outgoing` is how often
    /// the client must send, `incoming` how often it expects to hear from the
    /// server. Either side advertising zero disables that direction.
    pub fn negotiate(client: HeartBeat, server: HeartBeat) -> HeartBeat {
        let pick = |a: Duration, b: Duration| {
            if a.is_zero() || b.is_zero() {
                Duration::ZERO
            } else {
                a.max(b)
            }
        };
        HeartBeat {
            outgoing: pick(client.outgoing, server.incoming),
            incoming: pick(client.incoming, server.outgoing),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order. Repeated names are kept; the first one wins.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    /// A frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // -----------------------------------------------------------------------
    // Client frame constructors
    // -----------------------------------------------------------------------

    /// CONNECT frame opening a STOMP 1.2 session.
    pub fn connect(host: &str, heart_beat: HeartBeat) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", crate::constants::STOMP_VERSION)
            .header("host", host)
            .header("heart-beat", heart_beat.header_value())
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    /// SEND frame carrying a JSON body.
    pub fn send_json(destination: &str, body: String) -> Self {
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(body)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Frame::new(Command::Disconnect).header("receipt", receipt)
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Serialize to wire text, including the trailing NUL.
    ///
    /// A `content-length` header is added for non-empty bodies unless one is
    /// already present.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parse every frame in one WebSocket text message.
///
/// Heart-beats (bare end-of-line characters) between or instead of frames are
/// skipped, so a pure heart-beat yields an empty vector.
pub fn parse_frames(raw: &str) -> Result<Vec<Frame>> {
    let mut frames = Vec::new();
    let mut rest = raw;
    loop {
        rest = rest.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            break;
        }
        let (frame, consumed) = parse_one(rest)?;
        frames.push(frame);
        rest = &rest[consumed..];
    }
    Ok(frames)
}

/// Like [`parse_frames`], but a malformed frame is skipped up to its NUL
/// terminator instead of failing the whole message.
///
/// Returns the frames that decoded and one error per skipped frame.
pub fn parse_frames_lossy(raw: &str) -> (Vec<Frame>, Vec<RideError>) {
    let mut frames = Vec::new();
    let mut errors = Vec::new();
    let mut rest = raw;
    loop {
        rest = rest.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            break;
        }
        match parse_one(rest) {
            Ok((frame, consumed)) => {
                frames.push(frame);
                rest = &rest[consumed..];
            }
            Err(e) => {
                errors.push(e);
                match rest.find('\0') {
                    Some(nul) => rest = &rest[nul + 1..],
                    None => break,
                }
            }
        }
    }
    (frames, errors)
}

/// Parse exactly one frame from the start of `raw`, returning it and the
/// number of bytes consumed (including the NUL terminator).
fn parse_one(raw: &str) -> Result<(Frame, usize)> {
    let lf = raw.find("\n\n").map(|i| (i, i + 2));
    let crlf = raw.find("\r\n\r\n").map(|i| (i, i + 4));
    let header_end = match (lf, crlf) {
        (Some(a), Some(b)) => a.min(b),
        (a, b) => a.or(b).ok_or_else(|| RideError::Decode("frame has no header terminator".into()))?,
    };
    let (head, body_start) = (&raw[..header_end.0], header_end.1);

    let mut lines = head.lines();
    let command_line = lines.next().unwrap_or_default().trim_end_matches('\r');
    let command = Command::parse(command_line)
        .ok_or_else(|| RideError::Decode(format!("unknown STOMP command {command_line:?}")))?;

    let unescape = command.escapes_headers();
    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| RideError::Decode(format!("malformed header line {line:?}")))?;
        if unescape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_owned(), value.to_owned()));
        }
    }

    let frame_headers = Frame {
        command,
        headers,
        body: String::new(),
    };

    let body_region = &raw[body_start..];
    let (body, consumed_body) = match frame_headers.get("content-length") {
        Some(len) => {
            let len: usize = len
                .trim()
                .parse()
                .map_err(|_| RideError::Decode(format!("bad content-length {len:?}")))?;
            let body = body_region
                .get(..len)
                .ok_or_else(|| RideError::Decode("body shorter than content-length".into()))?;
            if body_region.as_bytes().get(len) != Some(&0) {
                return Err(RideError::Decode("missing NUL after content-length body".into()));
            }
            (body, len + 1)
        }
        None => {
            let nul = body_region
                .find('\0')
                .ok_or_else(|| RideError::Decode("frame is not NUL-terminated".into()))?;
            (&body_region[..nul], nul + 1)
        }
    };

    Ok((
        Frame {
            body: body.to_owned(),
            ..frame_headers
        },
        body_start + consumed_body,
    ))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(RideError::Decode(format!(
                    "invalid header escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}
