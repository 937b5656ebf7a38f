//! Gateway Probes
//!
//! Health, readiness, and Prometheus scrape endpoints. They are served on a
//! separate port so probes never queue behind long-lived streams.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON report: status, version, uptime, upstream usage
//! - `GET /healthz` - Liveness, always 200 while the process serves HTTP
//! - `GET /readyz` - 200 once an upstream credential is configured, else 503
//! - `GET /metrics` - Prometheus text exposition

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::ActiveUpstreams;
use crate::infrastructure::metrics::get_metrics_handle;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

// =============================================================================
// Reports
// =============================================================================

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: GatewayStatus,
    /// Gateway version.
    pub version: String,
    /// Seconds since the gateway started.
    pub uptime_secs: u64,
    /// When the report was produced.
    pub checked_at: DateTime<Utc>,
    /// Whether an upstream credential is loaded.
    pub credential_configured: bool,
    /// Upstream connections currently open.
    pub active_upstreams: usize,
}

/// Overall gateway status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    /// Streams are being proxied.
    Healthy,
    /// Serving, but every stream gets `not_configured`.
    Degraded,
}

impl GatewayStatus {
    const fn for_credential(configured: bool) -> Self {
        if configured {
            Self::Healthy
        } else {
            Self::Degraded
        }
    }
}

/// Body of `GET /readyz`.
#[derive(Debug, Clone, Serialize)]
struct Readiness {
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

// =============================================================================
// State
// =============================================================================

/// What the probes report on.
#[derive(Debug)]
pub struct HealthState {
    version: String,
    started_at: Instant,
    credential_configured: bool,
    active: ActiveUpstreams,
}

impl HealthState {
    /// Probe state for a gateway whose upstream usage is tracked by `active`.
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        credential_configured: bool,
        active: ActiveUpstreams,
    ) -> Self {
        Self {
            version: version.into(),
            started_at: Instant::now(),
            credential_configured,
            active,
        }
    }

    /// Current report.
    #[must_use]
    pub fn report(&self) -> HealthReport {
        HealthReport {
            status: GatewayStatus::for_credential(self.credential_configured),
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            checked_at: Utc::now(),
            credential_configured: self.credential_configured,
            active_upstreams: self.active.current(),
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// Router with every probe endpoint.
pub fn health_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(|| async { StatusCode::OK }))
        .route("/readyz", get(readiness))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the probes on `port` until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server fails.
pub async fn serve_health(
    port: u16,
    state: Arc<HealthState>,
    shutdown: CancellationToken,
) -> Result<(), HealthServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| HealthServerError::Bind { port, source })?;

    tracing::info!(port, "Health server listening");
    axum::serve(listener, health_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(HealthServerError::Serve)?;
    tracing::info!("Health server stopped");
    Ok(())
}

async fn health(State(state): State<Arc<HealthState>>) -> Json<HealthReport> {
    Json(state.report())
}

async fn readiness(State(state): State<Arc<HealthState>>) -> Response {
    if state.credential_configured {
        let body = Readiness {
            ready: true,
            reason: None,
        };
        return (StatusCode::OK, Json(body)).into_response();
    }
    let body = Readiness {
        ready: false,
        reason: Some("upstream credential is not configured"),
    };
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

async fn metrics() -> Response {
    match get_metrics_handle() {
        Some(handle) => {
            ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], handle.render()).into_response()
        }
        None => {
            (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response()
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Port could not be bound.
    #[error("failed to bind health port {port}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Server stopped with an error.
    #[error("health server failed")]
    Serve(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    async fn get(configured: bool, path: &str) -> (StatusCode, serde_json::Value) {
        let state = Arc::new(HealthState::new("test", configured, ActiveUpstreams::new()));
        let response = health_router(state)
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn readiness_follows_credential() {
        let (status, body) = get(true, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "ready": true }));

        let (status, body) = get(false, "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ready"], false);

        let (status, _) = get(false, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_upstream_usage() {
        let (status, body) = get(false, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["version"], "test");
        assert_eq!(body["credential_configured"], false);
        assert_eq!(body["active_upstreams"], 0);
    }

    #[test]
    fn report_reflects_credential() {
        let state = HealthState::new("1.0.0", true, ActiveUpstreams::new());

        let report = state.report();
        assert_eq!(report.status, GatewayStatus::Healthy);
        assert!(report.credential_configured);
        assert_eq!(report.active_upstreams, 0);
    }
}
