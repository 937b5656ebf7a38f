//! Domain Layer - Stream termination semantics.
//!
//! The gateway owns no data; what it does own is the rule for how a proxied
//! stream ends. Every failure becomes exactly one id-less `error` frame.

/// Gateway-side stream failures and their wire encoding.
pub mod failure;

pub use failure::StreamFailure;
