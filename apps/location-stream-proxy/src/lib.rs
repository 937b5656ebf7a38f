#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Location Stream Proxy - SSE Gateway
//!
//! An HTTP gateway in front of the location API's event stream. Browsers
//! call it without credentials; it attaches the vaulted token, forwards the
//! filter query verbatim, and re-streams the upstream frames line by line.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: how a proxied stream ends
//!   - `failure`: gateway failures and their `error` frames
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `UpstreamSource`
//!   - `services`: `GatewayService`, live upstream accounting
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `upstream`: `reqwest` upstream source
//!   - `http`: stream route, CORS
//!   - `config`: environment configuration
//!   - `health`: health, readiness, metrics endpoints
//!   - `telemetry`: tracing and OTLP export
//!
//! # Data Flow
//!
//! ```text
//! Browser ──GET ?users=..──► Gateway ──GET ?users=.. + token──► Location API
//!         ◄── event/data/id ──       ◄──────── SSE bytes ──────
//! ```
//!
//! One downstream connection holds at most one upstream connection; they
//! are torn down together.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Stream termination rules.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::StreamFailure;

// Application
pub use application::ports::{ByteStream, UpstreamError, UpstreamRequest, UpstreamSource};
pub use application::services::{ActiveUpstreams, GatewayService};

// Infrastructure
pub use infrastructure::config::{ConfigError, ProxyConfig};
pub use infrastructure::health::{HealthState, health_router, serve_health};
pub use infrastructure::http::stream_router;
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::upstream::HttpUpstreamSource;
