//! Movement Classification
//!
//! Decides whether a new sample is a movement, a dwell re-confirmation, or
//! noise, relative to the device's last accepted sample.
//!
//! # Signals
//!
//! | Tag        | Fires when                                   |
//! |------------|----------------------------------------------|
//! | `Distance` | haversine distance > `distance_m`            |
//! | `Speed`    | \|Δspeed\| > `speed_delta_kmh`               |
//! | `Bearing`  | circular \|Δbearing\| > `bearing_delta_deg`  |
//! | `Time`     | elapsed >= `reconfirm_after`                 |
//!
//! When several fire, the first row wins.

use std::time::Duration;

use chrono::TimeDelta;
use geo::{HaversineDistance, Point};

use super::sample::{DeviceState, DwellRecord, Motion, Sample};

// =============================================================================
// Thresholds
// =============================================================================

/// Limits beyond which a sample counts as changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Great-circle distance in meters.
    pub distance_m: f64,
    /// Interval after which an unchanged position is re-confirmed.
    pub reconfirm_after: Duration,
    /// Speed change in km/h.
    pub speed_delta_kmh: f64,
    /// Bearing change in degrees.
    pub bearing_delta_deg: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            distance_m: 20.0,
            reconfirm_after: Duration::from_secs(5 * 60),
            speed_delta_kmh: 5.0,
            bearing_delta_deg: 15.0,
        }
    }
}

// =============================================================================
// Tags
// =============================================================================

/// Why a sample was (or was not) accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassificationTag {
    /// First sample for the device.
    First,
    /// Moved farther than the distance threshold.
    Distance,
    /// Dwell re-confirmation after the time threshold.
    Time,
    /// Speed changed by more than the threshold.
    Speed,
    /// Bearing changed by more than the threshold.
    Bearing,
    /// Within every threshold.
    Unchanged,
}

impl ClassificationTag {
    /// Whether the sample became the new anchor.
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Whether the sample means the device is moving.
    #[must_use]
    pub const fn is_movement(self) -> bool {
        matches!(self, Self::Distance | Self::Speed | Self::Bearing)
    }

    /// Lowercase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Distance => "distance",
            Self::Time => "time",
            Self::Speed => "speed",
            Self::Bearing => "bearing",
            Self::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for ClassificationTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Great-circle distance between two samples in meters.
#[must_use]
pub fn distance_m(a: &Sample, b: &Sample) -> f64 {
    Point::new(a.lon, a.lat).haversine_distance(&Point::new(b.lon, b.lat))
}

/// Smallest angle between two compass bearings, in `[0, 180]`.
#[must_use]
pub fn bearing_delta(a: f64, b: f64) -> f64 {
    let diff = (a.rem_euclid(360.0) - b.rem_euclid(360.0)).abs();
    diff.min(360.0 - diff)
}

/// Classify `sample` against `prior`.
///
/// Pure: identical inputs always give identical outputs. The returned state
/// is `prior` unchanged for [`ClassificationTag::Unchanged`].
#[must_use]
pub fn classify(
    prior: &DeviceState,
    sample: &Sample,
    thresholds: &Thresholds,
) -> (DeviceState, ClassificationTag) {
    let Some(anchor) = &prior.anchor else {
        return (
            DeviceState {
                device_id: prior.device_id.clone(),
                anchor: Some(sample.clone()),
                motion: Motion::Moving,
            },
            ClassificationTag::First,
        );
    };

    let tag = tag_for(anchor, sample, thresholds);
    let motion = match tag {
        ClassificationTag::Unchanged => return (prior.clone(), tag),
        ClassificationTag::Time => Motion::Dwelling(reconfirm(prior, anchor, sample)),
        _ => Motion::Moving,
    };

    (
        DeviceState {
            device_id: prior.device_id.clone(),
            anchor: Some(sample.clone()),
            motion,
        },
        tag,
    )
}

fn tag_for(anchor: &Sample, sample: &Sample, thresholds: &Thresholds) -> ClassificationTag {
    if distance_m(anchor, sample) > thresholds.distance_m {
        return ClassificationTag::Distance;
    }

    if let (Some(before), Some(after)) = (anchor.speed_kmh, sample.speed_kmh)
        && (after - before).abs() > thresholds.speed_delta_kmh
    {
        return ClassificationTag::Speed;
    }

    if let (Some(before), Some(after)) = (anchor.bearing_deg, sample.bearing_deg)
        && bearing_delta(before, after) > thresholds.bearing_delta_deg
    {
        return ClassificationTag::Bearing;
    }

    let reconfirm_after = TimeDelta::from_std(thresholds.reconfirm_after).unwrap_or(TimeDelta::MAX);
    if sample.at - anchor.at >= reconfirm_after {
        return ClassificationTag::Time;
    }

    ClassificationTag::Unchanged
}

/// Extend the current dwell, or start one at the anchor.
fn reconfirm(prior: &DeviceState, anchor: &Sample, sample: &Sample) -> DwellRecord {
    match &prior.motion {
        Motion::Dwelling(record) => DwellRecord {
            last_confirmed_at: sample.at,
            ..record.clone()
        },
        Motion::Moving => DwellRecord {
            device_id: prior.device_id.clone(),
            anchor_lat: anchor.lat,
            anchor_lon: anchor.lon,
            dwell_started_at: anchor.at,
            last_confirmed_at: sample.at,
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    const LAT: f64 = 32.0777;
    const LON: f64 = 34.7733;

    fn t(minutes: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_704_103_200, 0).unwrap() + TimeDelta::minutes(minutes)
    }

    /// Latitude offset of roughly `meters` north.
    fn north(meters: f64) -> f64 {
        LAT + meters / 111_195.0
    }

    fn seeded(sample: Sample) -> DeviceState {
        classify(&DeviceState::new("d1"), &sample, &Thresholds::default()).0
    }

    #[test]
    fn first_sample_is_anchor() {
        let sample = Sample::new(LAT, LON, t(0));
        let (state, tag) = classify(&DeviceState::new("d1"), &sample, &Thresholds::default());

        assert_eq!(tag, ClassificationTag::First);
        assert_eq!(state.anchor, Some(sample));
        assert!(!state.is_dwelling());
    }

    #[test_case(Sample::new(north(25.0), LON, t(1)), ClassificationTag::Distance ; "distance")]
    #[test_case(Sample::new(north(5.0), LON, t(1)), ClassificationTag::Unchanged ; "small drift")]
    #[test_case(Sample::new(LAT, LON, t(4)), ClassificationTag::Unchanged ; "before interval")]
    #[test_case(Sample::new(LAT, LON, t(5)), ClassificationTag::Time ; "at interval")]
    #[test_case(Sample::new(LAT, LON, t(1)).with_speed(16.0), ClassificationTag::Speed ; "speed")]
    #[test_case(Sample::new(LAT, LON, t(1)).with_speed(14.0), ClassificationTag::Unchanged ; "speed within")]
    #[test_case(Sample::new(LAT, LON, t(1)).with_bearing(110.0), ClassificationTag::Bearing ; "bearing")]
    #[test_case(Sample::new(LAT, LON, t(1)).with_bearing(85.0), ClassificationTag::Unchanged ; "bearing within")]
    fn single_signal(sample: Sample, expected: ClassificationTag) {
        let prior = seeded(Sample::new(LAT, LON, t(0)).with_speed(10.0).with_bearing(90.0));
        let (_, tag) = classify(&prior, &sample, &Thresholds::default());
        assert_eq!(tag, expected);
    }

    #[test]
    fn speed_needs_both_sides() {
        let prior = seeded(Sample::new(LAT, LON, t(0)));
        let sample = Sample::new(LAT, LON, t(1)).with_speed(80.0);
        assert_eq!(
            classify(&prior, &sample, &Thresholds::default()).1,
            ClassificationTag::Unchanged
        );
    }

    #[test_case(350.0, 10.0, 20.0 ; "wraps through north")]
    #[test_case(10.0, 350.0, 20.0 ; "wraps other way")]
    #[test_case(0.0, 180.0, 180.0 ; "opposite")]
    #[test_case(-10.0, 10.0, 20.0 ; "negative input")]
    #[test_case(720.0, 0.0, 0.0 ; "full turns")]
    fn circular_bearing_delta(a: f64, b: f64, expected: f64) {
        assert!((bearing_delta(a, b) - expected).abs() < 1e-9);
    }

    #[test]
    fn wrapped_bearing_within_threshold_is_unchanged() {
        let prior = seeded(Sample::new(LAT, LON, t(0)).with_bearing(355.0));
        let sample = Sample::new(LAT, LON, t(1)).with_bearing(5.0);
        assert_eq!(
            classify(&prior, &sample, &Thresholds::default()).1,
            ClassificationTag::Unchanged
        );
    }

    #[test]
    fn distance_beats_bearing() {
        let prior = seeded(Sample::new(LAT, LON, t(0)).with_bearing(90.0));
        let sample = Sample::new(north(25.0), LON, t(1)).with_bearing(110.0);

        let (state, tag) = classify(&prior, &sample, &Thresholds::default());

        assert_eq!(tag, ClassificationTag::Distance);
        assert_eq!(state.anchor, Some(sample));
    }

    #[test]
    fn speed_beats_bearing_and_time() {
        let prior = seeded(Sample::new(LAT, LON, t(0)).with_speed(0.0).with_bearing(0.0));
        let sample = Sample::new(LAT, LON, t(9)).with_speed(30.0).with_bearing(90.0);
        assert_eq!(
            classify(&prior, &sample, &Thresholds::default()).1,
            ClassificationTag::Speed
        );
    }

    #[test]
    fn unchanged_keeps_state() {
        let prior = seeded(Sample::new(LAT, LON, t(0)));
        let sample = Sample::new(north(3.0), LON, t(2));
        let (state, tag) = classify(&prior, &sample, &Thresholds::default());

        assert_eq!(tag, ClassificationTag::Unchanged);
        assert_eq!(state, prior);
    }

    #[test]
    fn dwell_anchor_survives_reconfirmations() {
        let thresholds = Thresholds::default();
        let mut state = seeded(Sample::new(LAT, LON, t(0)));

        for minutes in [5, 10, 15] {
            let (next, tag) = classify(&state, &Sample::new(LAT, LON, t(minutes)), &thresholds);
            assert_eq!(tag, ClassificationTag::Time);

            let dwell = next.dwell().unwrap();
            assert_eq!(dwell.dwell_started_at, t(0));
            assert_eq!(dwell.last_confirmed_at, t(minutes));
            assert_eq!((dwell.anchor_lat, dwell.anchor_lon), (LAT, LON));
            state = next;
        }

        assert_eq!(
            state.dwell().unwrap().dwell_duration(t(20)),
            TimeDelta::minutes(20)
        );
    }

    #[test]
    fn movement_ends_dwell() {
        let thresholds = Thresholds::default();
        let state = seeded(Sample::new(LAT, LON, t(0)));
        let (dwelling, _) = classify(&state, &Sample::new(LAT, LON, t(6)), &thresholds);
        assert!(dwelling.is_dwelling());

        let (moving, tag) = classify(&dwelling, &Sample::new(north(40.0), LON, t(7)), &thresholds);

        assert_eq!(tag, ClassificationTag::Distance);
        assert!(moving.dwell().is_none());
    }

    #[test]
    fn custom_thresholds() {
        let thresholds = Thresholds {
            distance_m: 100.0,
            ..Thresholds::default()
        };
        let prior = classify(&DeviceState::new("d1"), &Sample::new(LAT, LON, t(0)), &thresholds).0;
        let (_, tag) = classify(&prior, &Sample::new(north(50.0), LON, t(1)), &thresholds);
        assert_eq!(tag, ClassificationTag::Unchanged);
    }

    fn arb_sample() -> impl Strategy<Value = Sample> {
        (
            -89.0..89.0_f64,
            -179.0..179.0_f64,
            proptest::option::of(0.0..200.0_f64),
            proptest::option::of(0.0..360.0_f64),
            0_i64..100_000,
        )
            .prop_map(|(lat, lon, speed_kmh, bearing_deg, secs)| Sample {
                lat,
                lon,
                speed_kmh,
                bearing_deg,
                at: t(0) + TimeDelta::seconds(secs),
            })
    }

    proptest! {
        #[test]
        fn classify_is_deterministic(samples in proptest::collection::vec(arb_sample(), 1..20)) {
            let thresholds = Thresholds::default();
            let mut state = DeviceState::new("d1");
            for sample in &samples {
                let first = classify(&state, sample, &thresholds);
                let second = classify(&state, sample, &thresholds);
                prop_assert_eq!(&first, &second);
                state = first.0;
            }
        }

        #[test]
        fn unchanged_never_moves_anchor(samples in proptest::collection::vec(arb_sample(), 2..20)) {
            let thresholds = Thresholds::default();
            let mut state = DeviceState::new("d1");
            for sample in &samples {
                let (next, tag) = classify(&state, sample, &thresholds);
                if tag == ClassificationTag::Unchanged {
                    prop_assert_eq!(&next, &state);
                } else {
                    prop_assert_eq!(next.anchor.as_ref(), Some(sample));
                }
                state = next;
            }
        }
    }
}
