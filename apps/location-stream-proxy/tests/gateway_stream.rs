//! Gateway Streaming Integration Tests
//!
//! Runs the real gateway router against a real streaming upstream on
//! loopback and checks forwarding, headers, and connection teardown.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::stream;
use location_stream_proxy::infrastructure::config::{CorsSettings, Credentials, UpstreamSettings};
use location_stream_proxy::{ActiveUpstreams, GatewayService, HttpUpstreamSource, stream_router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "test-token-4f2a";

// =============================================================================
// Mock Upstream
// =============================================================================

#[derive(Debug, Clone, Default)]
struct RecordedRequest {
    query: Option<String>,
    authorization: Option<String>,
    api_token: Option<String>,
}

#[derive(Clone, Default)]
struct MockUpstream {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    open_bodies: Arc<AtomicUsize>,
}

struct BodyGuard(Arc<AtomicUsize>);

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn upstream_handler(
    State(mock): State<MockUpstream>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };
    mock.requests.lock().unwrap().push(RecordedRequest {
        query,
        authorization: header(AUTHORIZATION.as_str()),
        api_token: header("x-api-token"),
    });

    mock.open_bodies.fetch_add(1, Ordering::SeqCst);
    let guard = BodyGuard(Arc::clone(&mock.open_bodies));

    let frames = stream::unfold((0_u64, guard), |(n, guard)| async move {
        if n > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let ts = 1_704_103_200_000 + n * 1000;
        let frame = if n == 0 {
            format!(
                "event: point\ndata: {{\"device_id\":\"d1\",\"user_id\":\"adar\",\"lat\":32.0777,\"lon\":34.7733,\"server_timestamp_ms\":{ts}}}\nid: {ts}-1\n\n"
            )
        } else {
            format!(
                "event: heartbeat\ndata: {{\"active_devices\":1,\"server_timestamp_ms\":{ts}}}\nid: {ts}\n\n"
            )
        };
        Some((Ok::<_, Infallible>(frame), (n + 1, guard)))
    });

    ([(CONTENT_TYPE, "text/event-stream")], Body::from_stream(frames)).into_response()
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn start_upstream() -> (SocketAddr, MockUpstream) {
    let mock = MockUpstream::default();
    let app = Router::new()
        .route("/api/stream.php", get(upstream_handler))
        .with_state(mock.clone());
    (serve(app).await, mock)
}

// =============================================================================
// Gateway Harness
// =============================================================================

struct Gateway {
    addr: SocketAddr,
    active: ActiveUpstreams,
    shutdown: CancellationToken,
}

async fn start_gateway(upstream_base: &str) -> Gateway {
    let settings = UpstreamSettings {
        base_url: upstream_base.to_string(),
        stream_path: "stream.php".to_string(),
        connect_timeout: Duration::from_secs(2),
    };
    let source = HttpUpstreamSource::new(&settings, &Credentials::new(TOKEN.to_string())).unwrap();
    let shutdown = CancellationToken::new();
    let gateway = Arc::new(GatewayService::new(Some(Arc::new(source)), shutdown.clone()));
    let active = gateway.active_upstreams();
    let app = stream_router(gateway, "/api/stream", &CorsSettings::default());

    Gateway {
        addr: serve(app).await,
        active,
        shutdown,
    }
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Read until at least one complete frame has arrived.
async fn read_first_frame(response: reqwest::Response) -> (String, reqwest::Response) {
    let mut text = String::new();
    let mut response = response;
    while !text.contains("\n\n") {
        let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
            .await
            .expect("frame within timeout")
            .unwrap()
            .expect("stream still open");
        text.push_str(&String::from_utf8_lossy(&chunk));
    }
    (text, response)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn forwards_filter_and_secret_headers() {
    let (upstream_addr, mock) = start_upstream().await;
    let gateway = start_gateway(&format!("http://{upstream_addr}/api")).await;

    let response = reqwest::get(format!(
        "http://{}/api/stream?users=adar&heartbeat=10&limit=100",
        gateway.addr
    ))
    .await
    .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["cache-control"], "no-cache");
    assert_eq!(response.headers()["x-accel-buffering"], "no");

    let (text, response) = read_first_frame(response).await;
    assert!(text.starts_with("event: point\ndata: {"));
    assert!(text.contains("id: 1704103200000-1\n"));
    assert!(!text.contains(TOKEN));
    drop(response);

    let recorded = mock.requests.lock().unwrap()[0].clone();
    assert_eq!(
        recorded.query.as_deref(),
        Some("users=adar&heartbeat=10&limit=100")
    );
    assert_eq!(
        recorded.authorization.as_deref(),
        Some(format!("Bearer {TOKEN}").as_str())
    );
    assert_eq!(recorded.api_token.as_deref(), Some(TOKEN));
}

#[tokio::test]
async fn invalid_filter_never_reaches_upstream() {
    let (upstream_addr, mock) = start_upstream().await;
    let gateway = start_gateway(&format!("http://{upstream_addr}/api")).await;

    let body = reqwest::get(format!("http://{}/api/stream?heartbeat=10", gateway.addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("\"code\":\"invalid_filter\""));
    assert!(mock.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn closing_downstream_releases_upstream_every_cycle() {
    let (upstream_addr, mock) = start_upstream().await;
    let gateway = start_gateway(&format!("http://{upstream_addr}/api")).await;
    let client = reqwest::Client::new();

    for cycle in 0..10 {
        let response = client
            .get(format!("http://{}/api/stream?all=true", gateway.addr))
            .send()
            .await
            .unwrap();
        let (_, response) = read_first_frame(response).await;
        assert_eq!(gateway.active.current(), 1, "cycle {cycle}");
        drop(response);

        eventually("gateway upstream release", || gateway.active.current() == 0).await;
        eventually("upstream body drop", || {
            mock.open_bodies.load(Ordering::SeqCst) == 0
        })
        .await;
    }

    assert_eq!(mock.requests.lock().unwrap().len(), 10);
}

#[tokio::test]
async fn shutdown_emits_gateway_shutdown_and_closes() {
    let (upstream_addr, mock) = start_upstream().await;
    let gateway = start_gateway(&format!("http://{upstream_addr}/api")).await;

    let response = reqwest::get(format!("http://{}/api/stream?devices=d1", gateway.addr))
        .await
        .unwrap();
    let (_, response) = read_first_frame(response).await;

    gateway.shutdown.cancel();
    let rest = tokio::time::timeout(Duration::from_secs(5), response.text())
        .await
        .expect("stream ends after shutdown")
        .unwrap();

    assert!(rest.contains("\"code\":\"gateway_shutdown\""));
    assert!(rest.ends_with("\n\n"));
    eventually("upstream body drop", || {
        mock.open_bodies.load(Ordering::SeqCst) == 0
    })
    .await;
}

#[tokio::test]
async fn unreachable_upstream_is_reported() {
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = unused.local_addr().unwrap();
    drop(unused);
    let gateway = start_gateway(&format!("http://{dead_addr}")).await;

    let body = reqwest::get(format!("http://{}/api/stream?all=1", gateway.addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("\"code\":\"upstream_unreachable\""));
    assert_eq!(gateway.active.current(), 0);
}

#[tokio::test]
async fn repeated_keys_and_cursor_pass_through() {
    let (upstream_addr, mock) = start_upstream().await;
    let gateway = start_gateway(&format!("http://{upstream_addr}/api")).await;

    let response = reqwest::get(format!(
        "http://{}/api/stream?users=a&users=b&devices=d%201&since=1704103200000",
        gateway.addr
    ))
    .await
    .unwrap();
    let (_, response) = read_first_frame(response).await;
    drop(response);

    let recorded = mock.requests.lock().unwrap()[0].clone();
    assert_eq!(
        recorded.query.as_deref(),
        Some("users=a&users=b&devices=d%201&since=1704103200000")
    );
}
