//! HTTP upstream source.
//!
//! Opens `GET <base>/<stream path>?<caller query>` with the token attached as
//! headers. The client has a connect timeout and no overall timeout; the body
//! is consumed as a byte stream for as long as the caller keeps polling it.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};

use crate::application::ports::{ByteStream, UpstreamError, UpstreamRequest, UpstreamSource};
use crate::infrastructure::config::{ConfigError, Credentials, UpstreamSettings};

/// Secondary token header understood by the location API.
const API_TOKEN_HEADER: &str = "x-api-token";

/// Upstream source backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpUpstreamSource {
    client: Client,
    endpoint: String,
}

impl HttpUpstreamSource {
    /// Build the source from settings and the vaulted token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be sent as a header value or the
    /// HTTP client cannot be constructed.
    pub fn new(
        settings: &UpstreamSettings,
        credentials: &Credentials,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .default_headers(secret_headers(credentials)?)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "LOC_API_BASEURL".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: settings.stream_url(),
        })
    }

    /// Stream endpoint without query.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn secret_headers(credentials: &Credentials) -> Result<HeaderMap, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: "LOC_API_TOKEN".to_string(),
        reason: "contains characters not allowed in an HTTP header".to_string(),
    };

    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", credentials.token()))
        .map_err(|_| invalid())?;
    bearer.set_sensitive(true);

    let mut token = HeaderValue::from_str(credentials.token()).map_err(|_| invalid())?;
    token.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(API_TOKEN_HEADER, token);
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    Ok(headers)
}

#[async_trait]
impl UpstreamSource for HttpUpstreamSource {
    async fn open(&self, request: UpstreamRequest) -> Result<ByteStream, UpstreamError> {
        let response = self
            .client
            .get(request.url_for(&self.endpoint))
            .send()
            .await
            .map_err(|e| UpstreamError::Unreachable {
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let body = response
            .bytes_stream()
            .map_err(|e| UpstreamError::Transport {
                message: e.without_url().to_string(),
            });
        Ok(Box::pin(body))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn settings() -> UpstreamSettings {
        UpstreamSettings {
            base_url: "https://loc.example.com/api/".to_string(),
            stream_path: "/stream.php".to_string(),
            connect_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn endpoint_joins_base_and_path() {
        let source =
            HttpUpstreamSource::new(&settings(), &Credentials::new("tok".to_string())).unwrap();
        assert_eq!(source.endpoint(), "https://loc.example.com/api/stream.php");
    }

    #[test]
    fn token_with_newline_is_rejected() {
        let err = HttpUpstreamSource::new(&settings(), &Credentials::new("a\nb".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "LOC_API_TOKEN"));
    }

    #[test]
    fn secret_headers_are_sensitive() {
        let headers = secret_headers(&Credentials::new("tok".to_string())).unwrap();
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert!(headers[API_TOKEN_HEADER].is_sensitive());
        assert_eq!(headers[ACCEPT], "text/event-stream");
    }
}
