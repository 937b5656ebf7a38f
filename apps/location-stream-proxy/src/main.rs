//! Location Stream Proxy Binary
//!
//! Starts the SSE gateway and its health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin location-stream-proxy
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `LOC_API_BASEURL`: Location API base URL
//!
//! ## Optional
//! - `LOC_API_TOKEN`: Location API token (without it every stream gets `not_configured`)
//! - `LOC_API_STREAM_PATH`: Upstream stream path (default: stream.php)
//! - `STREAM_PROXY_HTTP_PORT`: Stream HTTP port (default: 8080)
//! - `STREAM_PROXY_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `STREAM_PROXY_PATH`: Stream route (default: /api/stream)
//! - `STREAM_PROXY_CONNECT_TIMEOUT_SECS`: Upstream connect timeout (default: 10)
//! - `CORS_ORIGINS`: Comma separated allowed origins
//! - `DEBUG_MODE`: Log filter values (default: false)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use location_stream_proxy::infrastructure::telemetry;
use location_stream_proxy::{
    GatewayService, HealthState, HttpUpstreamSource, ProxyConfig, UpstreamSource, init_metrics,
    serve_health, stream_router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long open streams get to drain after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();
    let _telemetry = telemetry::init();
    let _metrics = init_metrics();

    let config = ProxyConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
    })?;
    log_config(&config);

    let shutdown = CancellationToken::new();
    let gateway = Arc::new(
        GatewayService::new(upstream_source(&config)?, shutdown.clone())
            .with_debug_mode(config.debug_mode),
    );

    let health = HealthState::new(
        env!("CARGO_PKG_VERSION"),
        gateway.is_configured(),
        gateway.active_upstreams(),
    );
    let health_port = config.server.health_port;
    let health_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_health(health_port, Arc::new(health), health_shutdown).await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let streams = spawn_stream_server(&config, Arc::clone(&gateway), shutdown.clone()).await?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Location stream proxy ready");

    wait_for_signal().await;
    shutdown.cancel();
    tracing::info!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "Draining open streams");

    if tokio::time::timeout(DRAIN_TIMEOUT, streams).await.is_err() {
        tracing::warn!(
            active_upstreams = gateway.active_upstreams().current(),
            "Streams did not drain before the shutdown timeout"
        );
    }
    tracing::info!("Location stream proxy stopped");
    Ok(())
}

/// Upstream source for the configured credential, if any.
fn upstream_source(
    config: &ProxyConfig,
) -> Result<Option<Arc<dyn UpstreamSource>>, Box<dyn std::error::Error>> {
    let Some(credentials) = &config.credentials else {
        tracing::error!(
            "LOC_API_TOKEN is not set; every stream request will receive not_configured"
        );
        return Ok(None);
    };
    let source = HttpUpstreamSource::new(&config.upstream, credentials)?;
    Ok(Some(Arc::new(source)))
}

/// Bind the stream port and serve the gateway until `shutdown` fires.
async fn spawn_stream_server(
    config: &ProxyConfig,
    gateway: Arc<GatewayService>,
    shutdown: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    let app = stream_router(gateway, &config.server.stream_path, &config.cors);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.http_port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, path = %config.server.stream_path, "Stream server listening");

    Ok(tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;
        if let Err(e) = served {
            tracing::error!(error = %e, "Stream server error");
        }
        tracing::info!("Stream server stopped");
    }))
}

/// Never logs the token.
fn log_config(config: &ProxyConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        health_port = config.server.health_port,
        credential_configured = config.is_configured(),
        debug_mode = config.debug_mode,
        "Configuration loaded"
    );
    tracing::debug!(
        upstream = %config.upstream.stream_url(),
        connect_timeout_secs = config.upstream.connect_timeout.as_secs(),
        cors_origins = ?config.cors.allowed_origins,
        "Upstream endpoint"
    );
}

/// Load the nearest `.env`, searching the working directory and its ancestors.
fn load_dotenv() {
    let Ok(cwd) = std::env::current_dir() else {
        return;
    };
    if let Some(path) = cwd
        .ancestors()
        .map(|dir| dir.join(".env"))
        .find(|p| p.is_file())
    {
        let _ = dotenvy::from_path(path);
    }
}

/// Resolves on SIGINT or SIGTERM.
#[allow(clippy::expect_used)]
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())
            .expect("SIGTERM handler must install for clean drains");
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.expect("Ctrl+C handler must install for clean drains");
                tracing::info!(signal = "SIGINT", "Shutdown requested");
            }
            _ = terminate.recv() => {
                tracing::info!(signal = "SIGTERM", "Shutdown requested");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Ctrl+C handler must install for clean drains");
        tracing::info!(signal = "ctrl_c", "Shutdown requested");
    }
}
