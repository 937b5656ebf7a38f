//! Error types for the gateway stream client.

use std::time::Duration;

use location_protocol::FilterError;
use thiserror::Error;

/// Errors raised while opening or running a subscription.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Filter rejected before any connection was made.
    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),

    /// Invalid client configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong.
        message: String,
    },

    /// Failed to reach the gateway.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        /// Error message describing the connection failure.
        message: String,
    },

    /// Gateway answered with a non-success status.
    #[error("gateway returned status {status}")]
    GatewayStatus {
        /// HTTP status code.
        status: u16,
    },

    /// Gateway answered with something other than an event stream.
    #[error("gateway returned content type {content_type:?}, expected text/event-stream")]
    NotEventStream {
        /// Received content type.
        content_type: String,
    },

    /// Stream failed mid-read.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// Stream ended without an intentional close.
    #[error("stream ended unexpectedly")]
    StreamEnded,

    /// Nothing arrived within the idle timeout.
    #[error("no events for {0:?}")]
    IdleTimeout(Duration),

    /// Subscription is closed.
    #[error("subscription closed")]
    Closed,
}

impl ClientError {
    /// Whether the reconnect policy should handle this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::GatewayStatus { .. }
                | Self::NotEventStream { .. }
                | Self::Transport { .. }
                | Self::StreamEnded
                | Self::IdleTimeout(_)
        )
    }
}
