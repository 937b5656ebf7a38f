//! Gateway Configuration Settings
//!
//! Configuration types for the stream gateway, loaded from environment
//! variables. The upstream base URL is required; the upstream token is not,
//! so a misconfigured deployment still starts, reports itself unready, and
//! answers every stream request with `not_configured`.

use std::time::Duration;

/// Development origins used when `CORS_ORIGINS` is unset or empty.
const DEV_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:5173"];

/// Upstream location API token.
#[derive(Clone)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    /// Wrap a token.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self { token }
    }

    /// The raw token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Upstream stream source settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Base URL of the location API.
    pub base_url: String,
    /// Stream endpoint path relative to the base URL.
    pub stream_path: String,
    /// TCP/TLS connect timeout. There is no read timeout.
    pub connect_timeout: Duration,
}

impl UpstreamSettings {
    /// Absolute URL of the upstream stream endpoint, without a query.
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.stream_path.trim_start_matches('/')
        )
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Stream endpoint port.
    pub http_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
    /// Route serving the stream.
    pub stream_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 8080,
            health_port: 8082,
            stream_path: "/api/stream".to_string(),
        }
    }
}

/// Cross-origin settings.
#[derive(Debug, Clone)]
pub struct CorsSettings {
    /// Allowed origins; `*` allows any.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: DEV_CORS_ORIGINS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl CorsSettings {
    /// Parse a comma separated origin list, falling back to dev origins.
    #[must_use]
    pub fn from_list(raw: &str) -> Self {
        let allowed_origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(ToString::to_string)
            .collect();

        if allowed_origins.is_empty() {
            Self::default()
        } else {
            Self { allowed_origins }
        }
    }

    /// Whether any origin is accepted.
    #[must_use]
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upstream settings.
    pub upstream: UpstreamSettings,
    /// Upstream token, if configured.
    pub credentials: Option<Credentials>,
    /// Listener settings.
    pub server: ServerSettings,
    /// Cross-origin settings.
    pub cors: CorsSettings,
    /// Log filter values (user/device ids) at debug level.
    pub debug_mode: bool,
}

impl ProxyConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `LOC_API_BASEURL` is missing, empty, or not an
    /// absolute http(s) URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ProxyConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("LOC_API_BASEURL")
            .ok_or_else(|| ConfigError::MissingEnvVar("LOC_API_BASEURL".to_string()))?;
        let base_url = base_url.trim().to_string();
        if base_url.is_empty() {
            return Err(ConfigError::EmptyValue("LOC_API_BASEURL".to_string()));
        }
        validate_base_url(&base_url)?;

        let credentials = lookup("LOC_API_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(Credentials::new);

        let upstream = UpstreamSettings {
            base_url,
            stream_path: lookup("LOC_API_STREAM_PATH")
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| "stream.php".to_string()),
            connect_timeout: parse_duration_secs(
                &lookup,
                "STREAM_PROXY_CONNECT_TIMEOUT_SECS",
                Duration::from_secs(10),
            ),
        };

        let defaults = ServerSettings::default();
        let server = ServerSettings {
            http_port: parse_or(&lookup, "STREAM_PROXY_HTTP_PORT", defaults.http_port),
            health_port: parse_or(&lookup, "STREAM_PROXY_HEALTH_PORT", defaults.health_port),
            stream_path: lookup("STREAM_PROXY_PATH")
                .map(|p| normalize_route(&p))
                .unwrap_or(defaults.stream_path),
        };

        let cors = lookup("CORS_ORIGINS")
            .map(|raw| CorsSettings::from_list(&raw))
            .unwrap_or_default();

        let debug_mode = lookup("DEBUG_MODE").is_some_and(|v| parse_bool(&v));

        Ok(Self {
            upstream,
            credentials,
            server,
            cors,
            debug_mode,
        })
    }

    /// Whether the upstream token is present.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("environment variable {key} is invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn validate_base_url(base_url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: "LOC_API_BASEURL".to_string(),
        reason: reason.to_string(),
    };

    let url = reqwest::Url::parse(base_url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.query().is_some() {
        return Err(invalid("must not carry a query string"));
    }
    Ok(())
}

fn normalize_route(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return ServerSettings::default().stream_path;
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}
