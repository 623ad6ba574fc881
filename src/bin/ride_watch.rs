//! Binary that connects to the dispatch broker and follows one ride request
//! until it resolves, printing every reconciled transition.
//!
//! # Usage
//!
//! ```sh
//! export RIDESYNC_BROKER_URL="ws://localhost:8080/ws-uber/websocket"
//! export RIDESYNC_API_URL="http://localhost:8002/api/v1"
//! export RIDESYNC_TOKEN="your-jwt"
//!
//! # follow an existing request
//! cargo run --bin ride_watch --features cli -- <request-id>
//!
//! # submit a new request, then follow it
//! cargo run --bin ride_watch --features cli -- submit <user-id> <pickup-lat> <pickup-lng> <dropoff-lat> <dropoff-lng>
//! ```

use std::env;
use std::sync::Arc;

use chrono::Utc;
use ridesync_rs::error::{RideError, Result};
use ridesync_rs::ride::{DispatchEvent, Dispatcher, PollConfig, RideTracker};
use ridesync_rs::types::ride_request::RideRequestBody;
use ridesync_rs::{BookingClient, ConnectionConfig, ConnectionEvent, ConnectionManager};

fn usage() -> RideError {
    RideError::InvalidArgument(
        "usage: ride_watch <request-id> | ride_watch submit <user-id> <pickup-lat> <pickup-lng> <dropoff-lat> <dropoff-lng>"
            .into(),
    )
}

fn coordinate(raw: Option<String>) -> Result<f64> {
    raw.ok_or_else(usage)?
        .parse()
        .map_err(|_| RideError::InvalidArgument("coordinates must be decimal degrees".into()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let first = args.next().ok_or_else(usage)?;

    let backend = BookingClient::from_env()?;
    let connection = Arc::new(ConnectionManager::new(ConnectionConfig::from_env()?));
    let dispatcher = Arc::new(Dispatcher::new());
    let mut observer = dispatcher.register();

    let mut connection_events = connection.events();
    tokio::spawn(async move {
        while let Ok(event) = connection_events.recv().await {
            match event {
                ConnectionEvent::Ready => println!("[connection] connected"),
                ConnectionEvent::Reconnecting { attempt } => println!("[connection] reconnecting… ({attempt})"),
                ConnectionEvent::Error(e) => eprintln!("[connection] {e}"),
                ConnectionEvent::Failed { attempts } => {
                    eprintln!("[connection] gave up after {attempts} attempts; polling only")
                }
                ConnectionEvent::Closed => println!("[connection] closed"),
            }
        }
    });

    println!("Connecting to broker {}…", connection.config().broker_url);
    if let Err(e) = connection.connect().await {
        eprintln!("Broker unavailable ({e}); continuing with status polling");
    }

    let tracker = if first == "submit" {
        let request = RideRequestBody {
            user_id: args.next().ok_or_else(usage)?,
            pickup_latitude: coordinate(args.next())?,
            pickup_longitude: coordinate(args.next())?,
            dropoff_latitude: coordinate(args.next())?,
            dropoff_longitude: coordinate(args.next())?,
            pickup_time: Utc::now(),
        };
        RideTracker::submit(
            connection.clone(),
            backend,
            dispatcher.clone(),
            &request,
            PollConfig::default(),
        )
        .await?
    } else {
        RideTracker::start(
            connection.clone(),
            backend,
            dispatcher.clone(),
            first,
            PollConfig::default(),
        )
    };
    println!("Tracking ride request {}", tracker.request_id());

    let finished = tracker.finished();
    tokio::pin!(finished);
    let state = loop {
        tokio::select! {
            state = &mut finished => break state,
            Some(event) = observer.recv() => print_event(&event),
        }
    };
    // Events published just before the tracker ended.
    while let Some(event) = observer.try_recv() {
        print_event(&event);
    }

    println!("Final status: {}", state.status);
    connection.disconnect().await;
    println!("Done.");

    Ok(())
}

fn print_event(event: &DispatchEvent) {
    match event {
        DispatchEvent::Ride(t) => println!(
            "[{}] {} -> {} booking={:?} driver={:?} {}",
            t.source,
            t.from,
            t.to,
            t.state.booking_id,
            t.state.driver_id,
            t.state.message.as_deref().unwrap_or_default(),
        ),
        DispatchEvent::Expired { request_id } => {
            println!("No driver confirmed request {request_id} in time")
        }
        DispatchEvent::Anomaly(a) => {
            eprintln!("Conflicting booking ids: kept {}, ignored {}", a.existing, a.incoming)
        }
        DispatchEvent::Room(_) => {}
    }
}
