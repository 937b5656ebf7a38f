//! Per-Device Movement Tracking
//!
//! Applies [`classify`] to a stream of points, keeping one state per device.
//! Each device has its own lock, so points for different devices never wait
//! on each other; the outer map lock is held only for lookup and insert.

use std::collections::HashMap;
use std::sync::Arc;

use location_protocol::PointEvent;
use parking_lot::{Mutex, RwLock};

use super::classifier::{ClassificationTag, Thresholds, classify};
use super::sample::{DeviceState, MovementError, Sample};

/// Outcome of feeding one point to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Tag for the point.
    pub tag: ClassificationTag,
    /// Device state after the point.
    pub state: DeviceState,
}

/// Movement state for every device seen on a subscription.
#[derive(Debug, Default)]
pub struct MovementTracker {
    thresholds: Thresholds,
    devices: RwLock<HashMap<String, Arc<Mutex<DeviceState>>>>,
}

impl MovementTracker {
    /// Tracker with the given thresholds.
    #[must_use]
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Thresholds in use.
    #[must_use]
    pub const fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Classify a point and store the device's new state.
    ///
    /// # Errors
    ///
    /// Returns an error if the point has no usable position or time; the
    /// device's state is left as it was.
    pub fn observe(&self, point: &PointEvent) -> Result<Classification, MovementError> {
        let sample = Sample::from_point(point)?;
        Ok(self.observe_sample(&point.device_id, &sample))
    }

    /// Classify a sample for `device_id` and store the new state.
    pub fn observe_sample(&self, device_id: &str, sample: &Sample) -> Classification {
        let slot = self.slot(device_id);
        let mut state = slot.lock();
        let (next, tag) = classify(&state, sample, &self.thresholds);
        state.clone_from(&next);
        Classification { tag, state: next }
    }

    /// Current state of a device.
    #[must_use]
    pub fn state(&self, device_id: &str) -> Option<DeviceState> {
        let slot = self.devices.read().get(device_id).cloned()?;
        let state = slot.lock().clone();
        Some(state)
    }

    /// Number of devices seen.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }

    /// Forget a device; its next point is classified as `First`.
    pub fn forget(&self, device_id: &str) -> bool {
        self.devices.write().remove(device_id).is_some()
    }

    fn slot(&self, device_id: &str) -> Arc<Mutex<DeviceState>> {
        if let Some(slot) = self.devices.read().get(device_id) {
            return Arc::clone(slot);
        }
        let mut devices = self.devices.write();
        Arc::clone(
            devices
                .entry(device_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(DeviceState::new(device_id)))),
        )
    }
}
