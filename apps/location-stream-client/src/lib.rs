#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value
    )
)]

//! Location Stream Client - Subscriptions and Movement Classification
//!
//! Consumes the location stream gateway and classifies each device's points
//! as movement or dwelling.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: movement classification
//!   - `movement`: samples, thresholds, `classify`, per-device tracker
//!
//! - **Application**: wiring
//!   - `services`: `MovementFeed` subscription handler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `gateway_stream`: subscriptions, reconnection, liveness
//!   - `config`: tail binary environment configuration
//!   - `telemetry`: log subscriber
//!
//! # Connection States
//!
//! ```text
//! Idle ──open──► Connecting ──► Open ◄──► Reconnecting
//!                                 │             │
//!          close / closed event / terminal error / retries exhausted
//!                                 ▼             ▼
//!                                Closed (terminal)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Movement classification.
pub mod domain;

/// Application layer - Use cases.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::movement::{
    Classification, ClassificationTag, DeviceState, DwellRecord, Motion, MovementError,
    MovementTracker, Sample, Thresholds, classify,
};

// Application
pub use application::services::{ClassifiedPoint, MovementFeed};

// Infrastructure
pub use infrastructure::config::{ConfigError, TailConfig};
pub use infrastructure::gateway_stream::{
    ClientConfig, ClientError, ClientEvent, ConnectionState, ReconnectConfig, StreamClient,
    Subscription, SubscriptionHandle, SubscriptionHandler,
};
