//! Stream Events
//!
//! Typed payloads carried in the `data:` field of each frame, keyed by the
//! frame's `event:` type. Upstream payloads use snake_case; a few older field
//! names (`latitude`, `speed`, ...) are accepted as aliases, and numeric
//! fields may arrive as JSON strings.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Event Ids
// =============================================================================

/// Opaque event id as sent on the `id:` line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Wrap a raw id.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw id text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Position of this id in the upstream sequence, if it has the
    /// `<ms>` or `<ms>-<seq>` shape.
    #[must_use]
    pub fn position(&self) -> Option<EventPosition> {
        let (ms, seq) = match self.0.split_once('-') {
            Some((ms, seq)) => (ms, seq.parse().ok()?),
            None => (self.0.as_str(), 0),
        };
        let timestamp_ms: i64 = ms.parse().ok()?;
        (timestamp_ms >= 0).then_some(EventPosition {
            timestamp_ms,
            sequence: seq,
        })
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Comparable position derived from an [`EventId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventPosition {
    /// Server timestamp in epoch milliseconds.
    pub timestamp_ms: i64,
    /// Tie-breaker within the same millisecond.
    pub sequence: u64,
}

impl EventPosition {
    /// Value sent as `since` to resume after this position.
    #[must_use]
    pub const fn resume_cursor(self) -> i64 {
        self.timestamp_ms
    }
}

// =============================================================================
// Error Codes
// =============================================================================

/// Machine-readable code carried by `error` events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    /// Filter failed validation.
    InvalidFilter,
    /// Gateway has no upstream credential.
    NotConfigured,
    /// Upstream answered with a non-success status.
    UpstreamStatus,
    /// Upstream could not be reached.
    UpstreamUnreachable,
    /// Upstream stream failed mid-flight.
    UpstreamTransport,
    /// Gateway is shutting down.
    GatewayShutdown,
    /// Any code this build does not know.
    Other(String),
}

impl ErrorCode {
    /// Wire spelling.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidFilter => "invalid_filter",
            Self::NotConfigured => "not_configured",
            Self::UpstreamStatus => "upstream_status",
            Self::UpstreamUnreachable => "upstream_unreachable",
            Self::UpstreamTransport => "upstream_transport",
            Self::GatewayShutdown => "gateway_shutdown",
            Self::Other(code) => code,
        }
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "invalid_filter" => Self::InvalidFilter,
            "not_configured" => Self::NotConfigured,
            "upstream_status" => Self::UpstreamStatus,
            "upstream_unreachable" => Self::UpstreamUnreachable,
            "upstream_transport" => Self::UpstreamTransport,
            "gateway_shutdown" => Self::GatewayShutdown,
            _ => Self::Other(code),
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Other(code) => code,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// A single location sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointEvent {
    /// Device identifier.
    #[serde(deserialize_with = "lenient::string")]
    pub device_id: String,
    /// Owning user identifier.
    #[serde(deserialize_with = "lenient::string")]
    pub user_id: String,
    /// Login name of the owning user.
    #[serde(default)]
    pub username: Option<String>,
    /// Human-readable name of the owning user.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Latitude in degrees.
    #[serde(alias = "latitude", deserialize_with = "lenient::f64")]
    pub lat: f64,
    /// Longitude in degrees.
    #[serde(alias = "longitude", deserialize_with = "lenient::f64")]
    pub lon: f64,
    /// Horizontal accuracy in meters.
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub accuracy: Option<f64>,
    /// Altitude in meters.
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub altitude: Option<f64>,
    /// Ground speed in km/h.
    #[serde(default, alias = "speed", deserialize_with = "lenient::opt_f64")]
    pub speed_kmh: Option<f64>,
    /// Compass bearing in degrees, `[0, 360)`.
    #[serde(default, alias = "bearing", deserialize_with = "lenient::opt_f64")]
    pub bearing_deg: Option<f64>,
    /// Battery level, `0.0..=1.0`.
    #[serde(default, alias = "battery", deserialize_with = "lenient::opt_f64")]
    pub battery_fraction: Option<f64>,
    /// Device-side capture time.
    #[serde(default)]
    pub recorded_at: Option<String>,
    /// Server receive time as formatted by the upstream.
    #[serde(default)]
    pub server_time: Option<String>,
    /// Server receive time in epoch milliseconds.
    #[serde(deserialize_with = "lenient::i64")]
    pub server_timestamp_ms: i64,
}

/// Liveness frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    /// Devices currently reporting under the filter.
    #[serde(default)]
    pub active_devices: u32,
    /// Server time in epoch milliseconds.
    #[serde(default)]
    pub server_timestamp_ms: i64,
}

/// Session metadata sent once the upstream accepts the subscription.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectedEvent {
    /// Upstream-defined session fields.
    #[serde(flatten)]
    pub session: serde_json::Map<String, serde_json::Value>,
}

/// Protocol-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamErrorEvent {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
}

impl StreamErrorEvent {
    /// Build an error event.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether a consumer should stop rather than reconnect.
    ///
    /// `upstream_status` is terminal only for client errors that retrying
    /// cannot fix, so 408 and 429 stay retryable.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self.code {
            ErrorCode::InvalidFilter | ErrorCode::NotConfigured => true,
            ErrorCode::UpstreamStatus => self
                .status()
                .is_some_and(|s| (400..500).contains(&s) && s != 408 && s != 429),
            _ => false,
        }
    }

    /// HTTP status at the start of the message, for `upstream_status`.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        let digits: String = self
            .message
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    }
}

/// Intentional end of session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClosedEvent {
    /// Why the session ended.
    #[serde(default)]
    pub reason: String,
}

// =============================================================================
// Stream Event
// =============================================================================

/// Every event the stream can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Location sample.
    Point(PointEvent),
    /// Liveness frame.
    Heartbeat(HeartbeatEvent),
    /// Session accepted.
    Connected(ConnectedEvent),
    /// Protocol-level failure.
    Error(StreamErrorEvent),
    /// Session ended intentionally.
    Closed(ClosedEvent),
}

impl StreamEvent {
    /// Value of the frame's `event:` line.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Point(_) => event_type::POINT,
            Self::Heartbeat(_) => event_type::HEARTBEAT,
            Self::Connected(_) => event_type::CONNECTED,
            Self::Error(_) => event_type::ERROR,
            Self::Closed(_) => event_type::CLOSED,
        }
    }
}

/// Wire names for the `event:` line.
pub mod event_type {
    /// Location sample.
    pub const POINT: &str = "point";
    /// Liveness frame.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Session accepted.
    pub const CONNECTED: &str = "connected";
    /// Protocol-level failure.
    pub const ERROR: &str = "error";
    /// Session ended.
    pub const CLOSED: &str = "closed";
}

/// A decoded event with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    /// Id from the `id:` line, if any.
    pub id: Option<EventId>,
    /// Decoded payload.
    pub event: StreamEvent,
}

// =============================================================================
// Lenient Deserializers
// =============================================================================

mod lenient {
    use serde::de::Error as _;

    use super::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Int(i64),
        Float(f64),
        Text(String),
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Scalar::deserialize(d)? {
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Text(s) => s,
        })
    }

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Scalar::deserialize(d)? {
            #[allow(clippy::cast_precision_loss)]
            Scalar::Int(n) => Ok(n as f64),
            Scalar::Float(n) => Ok(n),
            Scalar::Text(s) => s.trim().parse().map_err(D::Error::custom),
        }
    }

    pub fn i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        match Scalar::deserialize(d)? {
            Scalar::Int(n) => Ok(n),
            #[allow(clippy::cast_possible_truncation)]
            Scalar::Float(n) => Ok(n as i64),
            Scalar::Text(s) => s.trim().parse().map_err(D::Error::custom),
        }
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        match Option::<Scalar>::deserialize(d)? {
            None => Ok(None),
            Some(Scalar::Text(s)) if s.trim().is_empty() => Ok(None),
            #[allow(clippy::cast_precision_loss)]
            Some(Scalar::Int(n)) => Ok(Some(n as f64)),
            Some(Scalar::Float(n)) => Ok(Some(n)),
            Some(Scalar::Text(s)) => s.trim().parse().map(Some).map_err(D::Error::custom),
        }
    }
}
