//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the HTTP surfaces.

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Stream HTTP route.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// Upstream stream source adapters.
pub mod upstream;
