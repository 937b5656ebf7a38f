//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the gateway service and the port it drives.

/// Port interfaces for external systems (upstream stream source).
pub mod ports;

/// Application services for proxied streams.
pub mod services;
