//! Shared test fixtures: an in-process STOMP broker and a scripted backend.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use ridesync_rs::error::{RideError, Result};
use ridesync_rs::ride::RideBackend;
use ridesync_rs::types::booking::Booking;
use ridesync_rs::types::ride_request::{RideRequestBody, RideStatusResponse};
use ridesync_rs::ws::stomp::{Command, Frame, parse_frames};

// ===================================================================
// STOMP broker stub
// ===================================================================

/// Instructions for the broker's active connection.
#[derive(Debug)]
pub enum BrokerCmd {
    /// Deliver `body` to every subscription on `destination`.
    Publish { destination: String, body: String },
    /// Send a raw text message as-is.
    Raw(String),
    /// Drop the TCP connection without a close handshake.
    Drop,
}

#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// Answer CONNECT with an ERROR frame carrying this message.
    pub reject: Option<String>,
    /// `heart-beat` header of the CONNECTED frame.
    pub heart_beat: String,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            reject: None,
            heart_beat: "0,0".into(),
        }
    }
}

/// A STOMP broker accepting one connection at a time on localhost.
pub struct StubBroker {
    pub url: String,
    /// Every frame received from clients, in arrival order.
    frames: mpsc::UnboundedReceiver<Frame>,
    cmds: mpsc::UnboundedSender<BrokerCmd>,
    connections: Arc<AtomicUsize>,
}

impl StubBroker {
    pub async fn start() -> Self {
        Self::start_with(BrokerOptions::default()).await
    }

    pub async fn start_with(options: BrokerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind broker");
        let addr: SocketAddr = listener.local_addr().expect("broker addr");
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (cmds, cmds_rx) = mpsc::unbounded_channel();
        let cmds_rx = Arc::new(tokio::sync::Mutex::new(cmds_rx));
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = connections.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let frames_tx = frames_tx.clone();
                let cmds_rx = cmds_rx.clone();
                let options = options.clone();
                tokio::spawn(async move {
                    serve(stream, options, frames_tx, cmds_rx).await;
                });
            }
        });

        Self {
            url: format!("ws://{addr}/ws-uber/websocket"),
            frames,
            cmds,
            connections,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn publish(&self, destination: &str, body: &str) {
        self.cmds
            .send(BrokerCmd::Publish {
                destination: destination.into(),
                body: body.into(),
            })
            .expect("broker running");
    }

    pub fn send_raw(&self, text: &str) {
        self.cmds.send(BrokerCmd::Raw(text.into())).expect("broker running");
    }

    pub fn drop_connection(&self) {
        self.cmds.send(BrokerCmd::Drop).expect("broker running");
    }

    /// Next client frame, within five seconds.
    pub async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), self.frames.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("broker stopped")
    }

    /// Next client frame with `command`, skipping others.
    pub async fn expect_frame(&mut self, command: Command) -> Frame {
        loop {
            let frame = self.next_frame().await;
            if frame.command == command {
                return frame;
            }
        }
    }

    /// Frames received so far that have not been consumed.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            out.push(frame);
        }
        out
    }
}

async fn serve(
    stream: TcpStream,
    options: BrokerOptions,
    frames_tx: mpsc::UnboundedSender<Frame>,
    cmds: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<BrokerCmd>>>,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    // CONNECT
    let connect = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Some(frame) = parse_frames(&text).ok().and_then(|f| f.into_iter().next()) {
                    break frame;
                }
            }
            Some(Ok(_)) => continue,
            _ => return,
        }
    };
    let _ = frames_tx.send(connect);

    if let Some(reason) = options.reject {
        let error = Frame::new(Command::Error)
            .header("message", reason)
            .with_body("rejected");
        let _ = ws.send(Message::Text(error.encode().into())).await;
        let _ = ws.close(None).await;
        return;
    }

    let connected = Frame::new(Command::Connected)
        .header("version", "1.2")
        .header("heart-beat", options.heart_beat.as_str());
    if ws.send(Message::Text(connected.encode().into())).await.is_err() {
        return;
    }

    let mut cmds = cmds.lock().await;
    let mut subscriptions: HashMap<String, String> = HashMap::new();
    let mut message_id = 0u64;

    loop {
        tokio::select! {
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    for frame in parse_frames(&text).unwrap_or_default() {
                        match frame.command {
                            Command::Subscribe => {
                                if let (Some(id), Some(dest)) = (frame.get("id"), frame.get("destination")) {
                                    subscriptions.insert(id.to_owned(), dest.to_owned());
                                }
                            }
                            Command::Unsubscribe => {
                                if let Some(id) = frame.get("id") {
                                    subscriptions.remove(id);
                                }
                            }
                            _ => {}
                        }
                        let disconnect = frame.command == Command::Disconnect;
                        let _ = frames_tx.send(frame);
                        if disconnect {
                            let _ = ws.close(None).await;
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            cmd = cmds.recv() => match cmd {
                Some(BrokerCmd::Publish { destination, body }) => {
                    for (id, dest) in &subscriptions {
                        if *dest != destination {
                            continue;
                        }
                        message_id += 1;
                        let message = Frame::new(Command::Message)
                            .header("destination", destination.as_str())
                            .header("subscription", id.as_str())
                            .header("message-id", message_id.to_string())
                            .with_body(body.as_str());
                        let _ = ws.send(Message::Text(message.encode().into())).await;
                    }
                }
                Some(BrokerCmd::Raw(text)) => {
                    let _ = ws.send(Message::Text(text.into())).await;
                }
                Some(BrokerCmd::Drop) | None => return,
            },
        }
    }
}

/// A ws:// URL nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("ws://{addr}/ws-uber/websocket")
}

// ===================================================================
// Scripted backend
// ===================================================================

/// A [`RideBackend`] that replays scripted status responses.
///
/// The last scripted response repeats once the script runs out.
#[derive(Debug, Default)]
pub struct FakeBackend {
    statuses: Mutex<VecDeque<Result<RideStatusResponse>>>,
    last: Mutex<Option<RideStatusResponse>>,
    bookings: Mutex<HashMap<i64, Booking>>,
    submitted: Mutex<Option<RideStatusResponse>>,
    pub status_calls: AtomicUsize,
    pub booking_calls: AtomicUsize,
    /// Status calls after this many never answer. Zero: always answer.
    hang_after: AtomicUsize,
    /// Instants of every status call.
    pub call_times: Mutex<Vec<tokio::time::Instant>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_status(&self, response: RideStatusResponse) {
        self.statuses.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_error(&self, message: &str) {
        self.statuses
            .lock()
            .unwrap()
            .push_back(Err(RideError::Transport(message.into())));
    }

    pub fn add_booking(&self, booking: Booking) {
        self.bookings.lock().unwrap().insert(booking.booking_id, booking);
    }

    pub fn on_submit(&self, response: RideStatusResponse) {
        *self.submitted.lock().unwrap() = Some(response);
    }

    /// Let the first `calls` status queries answer; later ones hang.
    pub fn hang_after(&self, calls: usize) {
        self.hang_after.store(calls, Ordering::SeqCst);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

impl RideBackend for FakeBackend {
    async fn fetch_status(&self, _request_id: &str) -> Result<RideStatusResponse> {
        let call = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.call_times.lock().unwrap().push(tokio::time::Instant::now());
        let hang_after = self.hang_after.load(Ordering::SeqCst);
        if hang_after != 0 && call > hang_after {
            return std::future::pending().await;
        }
        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => {
                *self.last.lock().unwrap() = Some(response.clone());
                Ok(response)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| RideError::Transport("no scripted status".into())),
        }
    }

    async fn fetch_booking(&self, booking_id: i64) -> Result<Booking> {
        self.booking_calls.fetch_add(1, Ordering::SeqCst);
        self.bookings
            .lock()
            .unwrap()
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| RideError::Transport(format!("no booking {booking_id}")))
    }

    async fn submit(&self, _request: &RideRequestBody) -> Result<RideStatusResponse> {
        self.submitted
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RideError::Transport("no scripted submit".into()))
    }
}

/// A status response for `request_id`.
pub fn status(request_id: &str, status: &str) -> RideStatusResponse {
    RideStatusResponse {
        request_id: Some(request_id.into()),
        status: status.into(),
        ..Default::default()
    }
}

/// A `CONFIRMED` status carrying `booking_id`.
pub fn confirmed(request_id: &str, booking_id: i64) -> RideStatusResponse {
    RideStatusResponse {
        booking_id: Some(booking_id),
        ..status(request_id, "CONFIRMED")
    }
}

/// Parse a booking from JSON.
pub fn booking(json: serde_json::Value) -> Booking {
    serde_json::from_value(json).expect("valid booking")
}
