//! Application Services
//!
//! - `GatewayService`: turns one downstream request into one proxied stream

mod gateway_service;

pub use gateway_service::{ActiveUpstreams, DownstreamStream, GatewayService};
