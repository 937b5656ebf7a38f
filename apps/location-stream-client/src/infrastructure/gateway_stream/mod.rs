//! Gateway Stream Client (Driven Adapter)
//!
//! Consumes the location stream gateway over HTTP and turns its SSE framing
//! into ordered, typed events for the caller.
//!
//! # Usage
//!
//! ```ignore
//! use location_stream_client::infrastructure::gateway_stream::{
//!     ClientConfig, ClientEvent, StreamClient,
//! };
//! use location_protocol::FilterSpec;
//!
//! let client = StreamClient::new(ClientConfig::new("http://localhost:8080/api/stream"))?;
//! let mut subscription = client.open(FilterSpec::for_users(["adar"]).with_heartbeat_secs(10))?;
//!
//! while let Some(event) = subscription.next().await {
//!     if let ClientEvent::Event(envelope) = event {
//!         println!("{:?}: {:?}", envelope.id, envelope.event);
//!     }
//! }
//! ```
//!
//! # Reconnection
//!
//! Transport errors, unexpected end of stream, non-event-stream responses,
//! and idle timeouts reconnect with exponential backoff, resuming from the
//! highest event id seen. A `closed` event or a terminal `error` event ends
//! the subscription instead.

mod client;
mod config;
mod driver;
mod error;
mod handler;
mod liveness;
mod reconnect;
mod subscription;

pub use client::StreamClient;
pub use config::{ClientConfig, DEFAULT_GATEWAY_URL};
pub use driver::RETRIES_EXHAUSTED;
pub use error::ClientError;
pub use handler::SubscriptionHandler;
pub use liveness::Liveness;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use subscription::{ClientEvent, ConnectionState, Subscription, SubscriptionHandle};
