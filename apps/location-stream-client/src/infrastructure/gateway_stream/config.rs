//! Configuration for the gateway stream client.

use std::time::Duration;

use location_protocol::FilterSpec;

use super::reconnect::ReconnectConfig;

/// Default gateway stream endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8080/api/stream";

/// Configuration for connecting to the stream gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Gateway stream URL (e.g., `http://localhost:8080/api/stream`).
    pub gateway_url: String,

    /// TCP/TLS connect timeout. There is no read timeout; the idle timeout
    /// covers silent connections.
    pub connect_timeout: Duration,

    /// Backoff between reconnection attempts.
    pub reconnect: ReconnectConfig,

    /// Fixed idle timeout. `None` means twice the filter's heartbeat interval.
    pub idle_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            idle_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with the given gateway URL.
    #[must_use]
    pub fn new(gateway_url: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            ..Default::default()
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the reconnect policy.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Override the idle timeout.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Idle timeout that applies to a subscription with `spec`.
    #[must_use]
    pub fn idle_timeout_for(&self, spec: &FilterSpec) -> Duration {
        self.idle_timeout
            .unwrap_or_else(|| spec.heartbeat_interval().saturating_mul(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.gateway_url, DEFAULT_GATEWAY_URL);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.idle_timeout, None);
    }

    #[test]
    fn idle_timeout_follows_heartbeat() {
        let config = ClientConfig::new("http://gw/api/stream");
        let spec = FilterSpec::all().with_heartbeat_secs(10);
        assert_eq!(config.idle_timeout_for(&spec), Duration::from_secs(20));

        let config = config.with_idle_timeout(Duration::from_millis(300));
        assert_eq!(config.idle_timeout_for(&spec), Duration::from_millis(300));
    }
}
