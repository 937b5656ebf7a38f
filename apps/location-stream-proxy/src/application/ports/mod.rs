//! Port Interfaces
//!
//! Contracts that infrastructure adapters implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `UpstreamSource`: opens the upstream location event stream

mod upstream_port;

pub use upstream_port::{ByteStream, UpstreamError, UpstreamRequest, UpstreamSource};

#[cfg(test)]
pub use upstream_port::MockUpstreamSource;
