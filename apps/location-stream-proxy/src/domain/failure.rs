//! Stream Failures
//!
//! Reasons a proxied stream ends early, mapped onto wire error codes.

use location_protocol::{ErrorCode, FilterError, encode_error};

/// Why the gateway is ending a stream with an `error` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFailure {
    /// Caller filter failed validation. No upstream call was made.
    InvalidFilter(FilterError),
    /// No upstream credential is configured.
    NotConfigured,
    /// Upstream answered with a non-success status.
    UpstreamStatus {
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase, may be empty.
        reason: String,
    },
    /// Upstream could not be reached.
    UpstreamUnreachable(String),
    /// Upstream stream failed after it started.
    UpstreamTransport(String),
    /// Gateway is shutting down.
    Shutdown,
}

impl StreamFailure {
    /// Wire error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidFilter(_) => ErrorCode::InvalidFilter,
            Self::NotConfigured => ErrorCode::NotConfigured,
            Self::UpstreamStatus { .. } => ErrorCode::UpstreamStatus,
            Self::UpstreamUnreachable(_) => ErrorCode::UpstreamUnreachable,
            Self::UpstreamTransport(_) => ErrorCode::UpstreamTransport,
            Self::Shutdown => ErrorCode::GatewayShutdown,
        }
    }

    /// Human-readable message. For `upstream_status` it starts with the
    /// numeric status so consumers can classify it.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::InvalidFilter(e) => e.to_string(),
            Self::NotConfigured => "upstream credential is not configured".to_string(),
            Self::UpstreamStatus { status, reason } if reason.is_empty() => status.to_string(),
            Self::UpstreamStatus { status, reason } => format!("{status} {reason}"),
            Self::UpstreamUnreachable(detail) => format!("upstream unreachable: {detail}"),
            Self::UpstreamTransport(detail) => format!("upstream stream failed: {detail}"),
            Self::Shutdown => "gateway is shutting down".to_string(),
        }
    }

    /// Encoded `error` frame, without an id.
    #[must_use]
    pub fn to_frame(&self) -> String {
        encode_error(&self.code(), &self.message())
    }
}
