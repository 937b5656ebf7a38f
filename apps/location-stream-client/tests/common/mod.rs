//! Scripted gateway on loopback shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::{StreamExt, stream};
use location_protocol::{EventId, HeartbeatEvent, PointEvent, StreamEvent, encode_event};
use location_stream_client::{ClientConfig, ClientEvent, ReconnectConfig, Subscription};
use tokio::net::TcpListener;

/// How the gateway answers one connection.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Send the frames, then end the body.
    Frames(Vec<String>),
    /// Send the frames, then keep the body open with nothing more.
    FramesThenHold(Vec<String>),
    /// Send the frames, then a heartbeat every 20ms until the client leaves.
    FramesThenHeartbeats(Vec<String>),
    /// Plain response with a status and no event stream.
    Status(StatusCode),
    /// 200 with a non-SSE content type.
    Html,
}

type Script = Arc<dyn Fn(usize) -> Reply + Send + Sync>;

#[derive(Clone)]
struct GatewayState {
    script: Script,
    queries: Arc<Mutex<Vec<String>>>,
    arrivals: Arc<Mutex<Vec<Instant>>>,
    open_bodies: Arc<AtomicUsize>,
}

struct BodyGuard(Arc<AtomicUsize>);

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A running scripted gateway.
pub struct MockGateway {
    /// Stream URL to hand to the client.
    pub url: String,
    queries: Arc<Mutex<Vec<String>>>,
    arrivals: Arc<Mutex<Vec<Instant>>>,
    open_bodies: Arc<AtomicUsize>,
}

impl MockGateway {
    /// Start a gateway that answers connection `n` with `script(n)`.
    pub async fn start(script: impl Fn(usize) -> Reply + Send + Sync + 'static) -> Self {
        let state = GatewayState {
            script: Arc::new(script),
            queries: Arc::default(),
            arrivals: Arc::default(),
            open_bodies: Arc::default(),
        };
        let app = Router::new()
            .route("/api/stream", get(handle))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/api/stream"),
            queries: state.queries,
            arrivals: state.arrivals,
            open_bodies: state.open_bodies,
        }
    }

    /// Query strings of every connection so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Number of connections so far.
    pub fn connections(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    /// Time between consecutive connections.
    pub fn gaps(&self) -> Vec<Duration> {
        self.arrivals
            .lock()
            .unwrap()
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect()
    }

    /// Response bodies the gateway is still writing.
    pub fn open_bodies(&self) -> usize {
        self.open_bodies.load(Ordering::SeqCst)
    }

    /// Client config with short, jitter-free backoff.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.url.clone()).with_reconnect(
            ReconnectConfig::default()
                .with_fixed_backoff(Duration::from_millis(20), Duration::from_millis(20)),
        )
    }
}

enum Tail {
    End,
    Hold,
    Heartbeats,
}

async fn handle(State(state): State<GatewayState>, RawQuery(query): RawQuery) -> Response {
    let index = {
        let mut queries = state.queries.lock().unwrap();
        queries.push(query.unwrap_or_default());
        state.arrivals.lock().unwrap().push(Instant::now());
        queries.len() - 1
    };

    let (frames, tail) = match (state.script)(index) {
        Reply::Frames(frames) => (frames, Tail::End),
        Reply::FramesThenHold(frames) => (frames, Tail::Hold),
        Reply::FramesThenHeartbeats(frames) => (frames, Tail::Heartbeats),
        Reply::Status(status) => return status.into_response(),
        Reply::Html => {
            return ([(CONTENT_TYPE, "text/html")], "<html>maintenance</html>").into_response();
        }
    };

    state.open_bodies.fetch_add(1, Ordering::SeqCst);
    let guard = BodyGuard(Arc::clone(&state.open_bodies));
    let sent = stream::iter(frames.into_iter().map(Ok::<_, Infallible>));
    let rest: stream::BoxStream<'static, Result<String, Infallible>> = match tail {
        Tail::End => stream::empty().boxed(),
        Tail::Hold => stream::pending().boxed(),
        Tail::Heartbeats => stream::unfold((), |()| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Some((Ok(heartbeat_frame()), ()))
        })
        .boxed(),
    };
    let body = stream::unfold((sent.chain(rest), guard), |(mut frames, guard)| async move {
        let frame = frames.next().await?;
        Some((frame, (frames, guard)))
    });

    ([(CONTENT_TYPE, "text/event-stream")], Body::from_stream(body)).into_response()
}

// =============================================================================
// Frames
// =============================================================================

/// A point for `device` at a fixed spot in Tel Aviv.
pub fn point(device: &str, server_timestamp_ms: i64, recorded_at: &str) -> PointEvent {
    PointEvent {
        device_id: device.to_string(),
        user_id: "adar".to_string(),
        username: Some("adar".to_string()),
        display_name: Some("Adar".to_string()),
        lat: 32.0777,
        lon: 34.7733,
        accuracy: Some(8.0),
        altitude: None,
        speed_kmh: Some(0.0),
        bearing_deg: None,
        battery_fraction: Some(0.8),
        recorded_at: Some(recorded_at.to_string()),
        server_time: None,
        server_timestamp_ms,
    }
}

/// Wire text of a point frame with `id`.
pub fn point_frame(id: &str, point: PointEvent) -> String {
    encode_event(&StreamEvent::Point(point), Some(&EventId::new(id))).unwrap()
}

/// Wire text of an id-less heartbeat frame.
pub fn heartbeat_frame() -> String {
    let heartbeat = HeartbeatEvent {
        active_devices: 1,
        server_timestamp_ms: 1_704_103_200_000,
    };
    encode_event(&StreamEvent::Heartbeat(heartbeat), None).unwrap()
}

/// Wire text of a point frame for device `d1` whose id is `ms-seq`.
pub fn simple_point(ms: i64, seq: u64) -> String {
    point_frame(
        &format!("{ms}-{seq}"),
        point("d1", ms, "2024-01-01T10:00:00Z"),
    )
}

// =============================================================================
// Waiting
// =============================================================================

/// Next item from the subscription, failing the test after five seconds.
pub async fn next_event(subscription: &mut Subscription) -> Option<ClientEvent> {
    tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .expect("timed out waiting for a subscription event")
}

/// Next stream event, skipping state changes.
pub async fn next_envelope(subscription: &mut Subscription) -> ClientEvent {
    loop {
        match next_event(subscription).await {
            Some(ClientEvent::State(_)) => {}
            Some(other) => return other,
            None => panic!("subscription ended early"),
        }
    }
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..250 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}
