//! Tail Configuration
//!
//! Environment configuration for the `location-stream-tail` binary.
//!
//! # Environment Variables
//!
//! - `STREAM_GATEWAY_URL`: Gateway stream URL (default: http://localhost:8080/api/stream)
//! - `STREAM_ALL`: Follow every device (default: false)
//! - `STREAM_USERS`: Comma separated user ids
//! - `STREAM_DEVICES`: Comma separated device ids
//! - `STREAM_HEARTBEAT_SECS`: Heartbeat interval (default: 15)
//! - `STREAM_LIMIT`: Points per upstream cycle (default: 100)
//! - `STREAM_MAX_RECONNECT_ATTEMPTS`: Reconnect budget, 0 = unlimited (default: 10)

use std::str::FromStr;

use location_protocol::{FilterError, FilterSpec};

use crate::infrastructure::gateway_stream::{ClientConfig, DEFAULT_GATEWAY_URL, ReconnectConfig};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },

    /// The resulting filter is invalid.
    #[error("invalid stream filter: {0}")]
    Filter(#[from] FilterError),
}

/// Everything the tail binary needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct TailConfig {
    /// Client configuration.
    pub client: ClientConfig,
    /// Subscription filter.
    pub filter: FilterSpec,
}

impl TailConfig {
    /// Load from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error for unparsable values or an invalid filter.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error for unparsable values or an invalid filter.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let gateway_url =
            get("STREAM_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());
        let max_attempts = parse(&get, "STREAM_MAX_RECONNECT_ATTEMPTS")?
            .unwrap_or(ReconnectConfig::default().max_attempts);

        let mut filter = FilterSpec {
            include_all: parse_flag(&get, "STREAM_ALL")?,
            users: list(get("STREAM_USERS")),
            devices: list(get("STREAM_DEVICES")),
            ..FilterSpec::default()
        };
        if let Some(secs) = parse(&get, "STREAM_HEARTBEAT_SECS")? {
            filter.heartbeat_secs = secs;
        }
        if let Some(limit) = parse(&get, "STREAM_LIMIT")? {
            filter.max_points_per_cycle = limit;
        }
        filter.validate()?;

        Ok(Self {
            client: ClientConfig::new(gateway_url)
                .with_reconnect(ReconnectConfig::default().with_max_attempts(max_attempts)),
            filter,
        })
    }
}

fn parse<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key, value })
        })
        .transpose()
}

fn parse_flag<G>(get: &G, key: &'static str) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("false" | "0" | "no") => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some(other) => Err(ConfigError::InvalidValue {
            key,
            value: other.to_string(),
        }),
    }
}

fn list<C: FromIterator<String>>(raw: Option<String>) -> C {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
