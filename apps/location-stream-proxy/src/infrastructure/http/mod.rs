//! HTTP Surface
//!
//! The stream route consumed by browsers and the stream client.

mod router;

pub use router::{STREAM_HEADERS, cors_layer, stream_router};
