//! Upstream Source Port (Driven Port)
//!
//! Interface for opening the upstream location event stream. Implementations
//! attach the credential themselves; callers only supply the query.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::domain::StreamFailure;

/// Raw upstream body chunks. Dropping the stream releases the connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// A request for the upstream stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpstreamRequest {
    /// Caller query string, forwarded verbatim.
    pub query: Option<String>,
}

impl UpstreamRequest {
    /// Request forwarding the given raw query.
    #[must_use]
    pub fn new(query: Option<String>) -> Self {
        Self {
            query: query.filter(|q| !q.is_empty()),
        }
    }

    /// `endpoint` with the forwarded query appended.
    #[must_use]
    pub fn url_for(&self, endpoint: &str) -> String {
        match &self.query {
            Some(query) => format!("{endpoint}?{query}"),
            None => endpoint.to_string(),
        }
    }
}

/// Upstream errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Upstream responded with a non-success status.
    #[error("upstream returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase.
        reason: String,
    },

    /// Connection could not be established.
    #[error("upstream unreachable: {message}")]
    Unreachable {
        /// Error details.
        message: String,
    },

    /// Stream failed after the response started.
    #[error("upstream transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },
}

impl From<UpstreamError> for StreamFailure {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Status { status, reason } => Self::UpstreamStatus { status, reason },
            UpstreamError::Unreachable { message } => Self::UpstreamUnreachable(message),
            UpstreamError::Transport { message } => Self::UpstreamTransport(message),
        }
    }
}

/// Opens the upstream event stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Open a stream for `request`. Resolves once response headers arrive.
    async fn open(&self, request: UpstreamRequest) -> Result<ByteStream, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_is_dropped() {
        assert_eq!(UpstreamRequest::new(Some(String::new())).query, None);
    }

    #[test]
    fn url_appends_query_verbatim() {
        let request = UpstreamRequest::new(Some("users=adar&heartbeat=10&limit=100".into()));
        assert_eq!(
            request.url_for("https://loc.example.com/stream.php"),
            "https://loc.example.com/stream.php?users=adar&heartbeat=10&limit=100"
        );
    }

    #[test]
    fn status_error_maps_to_failure() {
        let failure = StreamFailure::from(UpstreamError::Status {
            status: 503,
            reason: "Service Unavailable".into(),
        });
        assert_eq!(failure.message(), "503 Service Unavailable");
    }
}
