//! Infrastructure Layer - Adapters and external integrations.

/// Tail binary configuration.
pub mod config;

/// Gateway stream client.
pub mod gateway_stream;

/// Logging setup.
pub mod telemetry;
