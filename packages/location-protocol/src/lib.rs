#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::needless_pass_by_value
    )
)]

//! Location Protocol - Shared Stream Contract
//!
//! The wire contract between the location stream gateway and its consumers.
//!
//! - `filter`: subscription filter, validation, and query-string encoding
//! - `event`: typed stream events, event ids, and error codes
//! - `frame`: incremental line buffering and SSE frame decoding/encoding
//! - `codec`: conversion between frames and typed events
//!
//! # Wire Format
//!
//! ```text
//! event: point
//! data: {"device_id":"d1","user_id":"u1","lat":32.0777,"lon":34.7733,...}
//! id: 1700000000000-1
//!
//! : keep-alive comment
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

pub mod codec;
pub mod event;
pub mod filter;
pub mod frame;

// =============================================================================
// Re-exports
// =============================================================================

pub use codec::{CodecError, decode_frame, encode_error, encode_event};
pub use event::{
    ClosedEvent, ConnectedEvent, ErrorCode, EventEnvelope, EventId, EventPosition,
    HeartbeatEvent, PointEvent, StreamErrorEvent, StreamEvent,
};
pub use filter::{FilterError, FilterParams, FilterSpec};
pub use frame::{Decoded, Frame, FrameDecoder, LineBuffer};
