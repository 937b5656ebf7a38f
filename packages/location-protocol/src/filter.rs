//! Subscription Filter
//!
//! Which devices a stream covers and how the upstream paces it. Serialized as
//! query parameters:
//!
//! ```text
//! ?all=<bool>&users=<repeated>&devices=<repeated>&since=<ms>&heartbeat=<1..3600>&limit=<1..500>
//! ```
//!
//! A filter must select something: `all=true`, at least one user, or at least
//! one device. Both the gateway and the client reject an empty filter before
//! any connection is opened.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Heartbeat interval used when the caller does not supply one.
pub const DEFAULT_HEARTBEAT_SECS: u32 = 15;

/// Smallest accepted heartbeat interval.
pub const MIN_HEARTBEAT_SECS: u32 = 1;

/// Largest accepted heartbeat interval.
pub const MAX_HEARTBEAT_SECS: u32 = 3600;

/// Points per upstream cycle used when the caller does not supply a limit.
pub const DEFAULT_MAX_POINTS_PER_CYCLE: u32 = 100;

/// Largest accepted points-per-cycle limit.
pub const MAX_POINTS_PER_CYCLE: u32 = 500;

/// Query parameter names.
pub mod param {
    /// Select every device.
    pub const ALL: &str = "all";
    /// Repeated user id.
    pub const USERS: &str = "users";
    /// Repeated device id.
    pub const DEVICES: &str = "devices";
    /// Resume cursor in epoch milliseconds.
    pub const SINCE: &str = "since";
    /// Heartbeat interval in seconds.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Maximum points per upstream cycle.
    pub const LIMIT: &str = "limit";
}

// =============================================================================
// Errors
// =============================================================================

/// Rejection reasons for a subscription filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Neither `all`, users, nor devices were supplied.
    #[error("filter must set all=true or name at least one user or device")]
    NoTarget,

    /// Heartbeat outside 1..=3600 seconds.
    #[error("heartbeat must be between 1 and 3600 seconds, got {0}")]
    HeartbeatOutOfRange(u32),

    /// Limit outside 1..=500.
    #[error("limit must be between 1 and 500, got {0}")]
    LimitOutOfRange(u32),

    /// Negative resume cursor.
    #[error("since must be a non-negative epoch millisecond value, got {0}")]
    NegativeCursor(i64),

    /// A parameter value could not be parsed.
    #[error("invalid value for `{param}`: {value:?}")]
    InvalidValue {
        /// Parameter name.
        param: &'static str,
        /// Raw value as received.
        value: String,
    },

    /// The query string itself could not be decoded.
    #[error("malformed query: {0}")]
    Malformed(String),
}

// =============================================================================
// Filter Spec
// =============================================================================

/// A validated-on-demand subscription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    /// Select every device regardless of users/devices.
    pub include_all: bool,
    /// User ids to include.
    pub users: BTreeSet<String>,
    /// Device ids to include.
    pub devices: BTreeSet<String>,
    /// Resume strictly after this server timestamp (epoch ms).
    pub resume_cursor: Option<i64>,
    /// Heartbeat interval requested from the upstream.
    pub heartbeat_secs: u32,
    /// Maximum points the upstream emits per polling cycle.
    pub max_points_per_cycle: u32,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            include_all: false,
            users: BTreeSet::new(),
            devices: BTreeSet::new(),
            resume_cursor: None,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            max_points_per_cycle: DEFAULT_MAX_POINTS_PER_CYCLE,
        }
    }
}

impl FilterSpec {
    /// Filter selecting every device.
    #[must_use]
    pub fn all() -> Self {
        Self {
            include_all: true,
            ..Self::default()
        }
    }

    /// Filter selecting the given users.
    #[must_use]
    pub fn for_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Filter selecting the given devices.
    #[must_use]
    pub fn for_devices<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            devices: devices.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add a user id.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.users.insert(user.into());
        self
    }

    /// Add a device id.
    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.devices.insert(device.into());
        self
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub const fn with_heartbeat_secs(mut self, secs: u32) -> Self {
        self.heartbeat_secs = secs;
        self
    }

    /// Set the points-per-cycle limit.
    #[must_use]
    pub const fn with_max_points_per_cycle(mut self, limit: u32) -> Self {
        self.max_points_per_cycle = limit;
        self
    }

    /// Set or clear the resume cursor.
    #[must_use]
    pub const fn with_resume_cursor(mut self, cursor: Option<i64>) -> Self {
        self.resume_cursor = cursor;
        self
    }

    /// Whether at least one filter dimension selects devices.
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.include_all || !self.users.is_empty() || !self.devices.is_empty()
    }

    /// Heartbeat interval as a duration.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.heartbeat_secs))
    }

    /// Check the filter invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), FilterError> {
        if !self.has_target() {
            return Err(FilterError::NoTarget);
        }
        if !(MIN_HEARTBEAT_SECS..=MAX_HEARTBEAT_SECS).contains(&self.heartbeat_secs) {
            return Err(FilterError::HeartbeatOutOfRange(self.heartbeat_secs));
        }
        if !(1..=MAX_POINTS_PER_CYCLE).contains(&self.max_points_per_cycle) {
            return Err(FilterError::LimitOutOfRange(self.max_points_per_cycle));
        }
        if let Some(cursor) = self.resume_cursor
            && cursor < 0
        {
            return Err(FilterError::NegativeCursor(cursor));
        }
        Ok(())
    }

    /// Query parameters in wire order: `all`, `users`, `devices`, `since`,
    /// `heartbeat`, `limit`. `all` is omitted when false and `since` when unset.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(self.users.len() + self.devices.len() + 4);
        if self.include_all {
            pairs.push((param::ALL, "true".to_string()));
        }
        pairs.extend(self.users.iter().map(|u| (param::USERS, u.clone())));
        pairs.extend(self.devices.iter().map(|d| (param::DEVICES, d.clone())));
        if let Some(cursor) = self.resume_cursor {
            pairs.push((param::SINCE, cursor.to_string()));
        }
        pairs.push((param::HEARTBEAT, self.heartbeat_secs.to_string()));
        pairs.push((param::LIMIT, self.max_points_per_cycle.to_string()));
        pairs
    }
}

// =============================================================================
// Raw Query Parameters
// =============================================================================

/// Query parameters as received, before interpretation.
///
/// Everything is kept as strings so a bad value becomes a precise
/// [`FilterError`] instead of a generic decode failure. Repeated keys
/// collect into the vectors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterParams {
    /// Raw `all` flag.
    #[serde(default)]
    pub all: Option<String>,
    /// Raw repeated `users`.
    #[serde(default)]
    pub users: Vec<String>,
    /// Raw repeated `devices`.
    #[serde(default)]
    pub devices: Vec<String>,
    /// Raw `since`.
    #[serde(default)]
    pub since: Option<String>,
    /// Raw `heartbeat`.
    #[serde(default)]
    pub heartbeat: Option<String>,
    /// Raw `limit`.
    #[serde(default)]
    pub limit: Option<String>,
}

impl TryFrom<FilterParams> for FilterSpec {
    type Error = FilterError;

    fn try_from(params: FilterParams) -> Result<Self, Self::Error> {
        let include_all = match params.all.as_deref().map(str::trim) {
            None | Some("") => false,
            Some(raw) => parse_flag(raw).ok_or_else(|| FilterError::InvalidValue {
                param: param::ALL,
                value: raw.to_string(),
            })?,
        };

        let spec = Self {
            include_all,
            users: collect_ids(params.users),
            devices: collect_ids(params.devices),
            resume_cursor: parse_number(param::SINCE, params.since.as_deref())?,
            heartbeat_secs: parse_number(param::HEARTBEAT, params.heartbeat.as_deref())?
                .unwrap_or(DEFAULT_HEARTBEAT_SECS),
            max_points_per_cycle: parse_number(param::LIMIT, params.limit.as_deref())?
                .unwrap_or(DEFAULT_MAX_POINTS_PER_CYCLE),
        };

        spec.validate()?;
        Ok(spec)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn collect_ids(raw: Vec<String>) -> BTreeSet<String> {
    raw.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_number<T: std::str::FromStr>(
    param: &'static str,
    raw: Option<&str>,
) -> Result<Option<T>, FilterError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| FilterError::InvalidValue {
                param,
                value: value.to_string(),
            }),
    }
}
