//! Movement Samples and Device State
//!
//! A [`Sample`] is the part of a point event the classifier looks at. A
//! [`DeviceState`] holds the last accepted sample (the anchor) and whether the
//! device is moving or dwelling.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use location_protocol::PointEvent;

/// Naive timestamp layout some devices report, interpreted as UTC.
const NAIVE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// Errors
// =============================================================================

/// Why a point could not be classified.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MovementError {
    /// Latitude or longitude outside the valid range or not finite.
    #[error("invalid coordinates ({lat}, {lon})")]
    InvalidCoordinates {
        /// Reported latitude.
        lat: f64,
        /// Reported longitude.
        lon: f64,
    },

    /// Neither `recorded_at` nor `server_timestamp_ms` gave a usable time.
    #[error("no usable sample time (server_timestamp_ms = {0})")]
    InvalidTimestamp(i64),
}

// =============================================================================
// Sample
// =============================================================================

/// One location sample as seen by the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Ground speed in km/h, if reported.
    pub speed_kmh: Option<f64>,
    /// Compass bearing in degrees, if reported.
    pub bearing_deg: Option<f64>,
    /// When the sample was taken.
    pub at: DateTime<Utc>,
}

impl Sample {
    /// Sample at a position and time with no speed or bearing.
    #[must_use]
    pub const fn new(lat: f64, lon: f64, at: DateTime<Utc>) -> Self {
        Self {
            lat,
            lon,
            speed_kmh: None,
            bearing_deg: None,
            at,
        }
    }

    /// Set the reported speed.
    #[must_use]
    pub const fn with_speed(mut self, speed_kmh: f64) -> Self {
        self.speed_kmh = Some(speed_kmh);
        self
    }

    /// Set the reported bearing.
    #[must_use]
    pub const fn with_bearing(mut self, bearing_deg: f64) -> Self {
        self.bearing_deg = Some(bearing_deg);
        self
    }

    /// Extract a sample from a point event.
    ///
    /// The time is `recorded_at` when it parses, else `server_timestamp_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error for unusable coordinates or time.
    pub fn from_point(point: &PointEvent) -> Result<Self, MovementError> {
        let valid = point.lat.is_finite()
            && point.lon.is_finite()
            && (-90.0..=90.0).contains(&point.lat)
            && (-180.0..=180.0).contains(&point.lon);
        if !valid {
            return Err(MovementError::InvalidCoordinates {
                lat: point.lat,
                lon: point.lon,
            });
        }

        let at = point
            .recorded_at
            .as_deref()
            .and_then(parse_time)
            .or_else(|| DateTime::from_timestamp_millis(point.server_timestamp_ms))
            .ok_or(MovementError::InvalidTimestamp(point.server_timestamp_ms))?;

        Ok(Self {
            lat: point.lat,
            lon: point.lon,
            speed_kmh: point.speed_kmh.filter(|s| s.is_finite()),
            bearing_deg: point.bearing_deg.filter(|b| b.is_finite()),
            at,
        })
    }
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, NAIVE_TIME_FORMAT)
                .ok()
                .map(|t| t.and_utc())
        })
}

// =============================================================================
// Dwell
// =============================================================================

/// A device staying put.
#[derive(Debug, Clone, PartialEq)]
pub struct DwellRecord {
    /// Device the record belongs to.
    pub device_id: String,
    /// Where the dwell started.
    pub anchor_lat: f64,
    /// Where the dwell started.
    pub anchor_lon: f64,
    /// When the device arrived.
    pub dwell_started_at: DateTime<Utc>,
    /// Latest re-confirmation.
    pub last_confirmed_at: DateTime<Utc>,
}

impl DwellRecord {
    /// Time spent at the anchor as of `now`.
    #[must_use]
    pub fn dwell_duration(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.dwell_started_at
    }
}

/// Whether a device is moving or dwelling.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Motion {
    /// Last accepted sample was a movement (or the first sample).
    #[default]
    Moving,
    /// Device has been re-confirmed at the same place.
    Dwelling(DwellRecord),
}

// =============================================================================
// Device State
// =============================================================================

/// Classifier state for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    /// Device identifier.
    pub device_id: String,
    /// Last accepted sample.
    pub anchor: Option<Sample>,
    /// Current motion.
    pub motion: Motion,
}

impl DeviceState {
    /// State for a device with no samples yet.
    #[must_use]
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            anchor: None,
            motion: Motion::Moving,
        }
    }

    /// Current dwell, if any.
    #[must_use]
    pub const fn dwell(&self) -> Option<&DwellRecord> {
        match &self.motion {
            Motion::Dwelling(record) => Some(record),
            Motion::Moving => None,
        }
    }

    /// Whether the device is dwelling.
    #[must_use]
    pub const fn is_dwelling(&self) -> bool {
        matches!(self.motion, Motion::Dwelling(_))
    }
}
