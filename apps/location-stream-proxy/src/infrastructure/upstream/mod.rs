//! Upstream Adapters
//!
//! Implementations of the `UpstreamSource` port.

mod http_source;

pub use http_source::HttpUpstreamSource;
