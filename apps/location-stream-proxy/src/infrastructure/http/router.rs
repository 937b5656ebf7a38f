//! Stream route.
//!
//! `GET <stream path>?all=..&users=..&devices=..&since=..&heartbeat=..&limit=..`
//! always answers `200 text/event-stream`; every failure is reported in-band
//! as an `error` frame so the consumer sees one protocol, never an HTTP error
//! page.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum_extra::extract::{Query, QueryRejection};
use location_protocol::{FilterError, FilterParams, FilterSpec};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::application::services::GatewayService;
use crate::infrastructure::config::CorsSettings;

/// Response headers for every stream response.
pub const STREAM_HEADERS: [(HeaderName, &str); 4] = [
    (CONTENT_TYPE, "text/event-stream"),
    (CACHE_CONTROL, "no-cache"),
    (CONNECTION, "keep-alive"),
    (HeaderName::from_static("x-accel-buffering"), "no"),
];

/// Router serving the stream at `stream_path`.
pub fn stream_router(
    gateway: Arc<GatewayService>,
    stream_path: &str,
    cors: &CorsSettings,
) -> Router {
    Router::new()
        .route(stream_path, get(stream_handler))
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/// CORS layer for the configured origins. Only `GET` is allowed.
#[must_use]
pub fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    if settings.allows_any() {
        tracing::warn!("CORS allows any origin; restrict CORS_ORIGINS in production");
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn stream_handler(
    State(gateway): State<Arc<GatewayService>>,
    RawQuery(raw_query): RawQuery,
    query: Result<Query<FilterParams>, QueryRejection>,
) -> Response {
    let filter = query
        .map_err(|rejection| FilterError::Malformed(rejection.to_string()))
        .and_then(|Query(params)| FilterSpec::try_from(params));

    let body = Body::from_stream(gateway.open(raw_query, filter));
    (STREAM_HEADERS.map(|(name, value)| (name, HeaderValue::from_static(value))), body)
        .into_response()
}
