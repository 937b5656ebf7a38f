//! Movement Classification
//!
//! Turns a device's point sequence into moving/dwelling segments.
//!
//! - `sample`: classifier input, device state, dwell records
//! - `classifier`: thresholds, tags, and the pure `classify` step
//! - `tracker`: per-device state behind per-device locks

mod classifier;
mod sample;
mod tracker;

pub use classifier::{ClassificationTag, Thresholds, bearing_delta, classify, distance_m};
pub use sample::{DeviceState, DwellRecord, Motion, MovementError, Sample};
pub use tracker::{Classification, MovementTracker};
