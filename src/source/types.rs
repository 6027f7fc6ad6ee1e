//! Sample types at the sensor boundary.

use serde::{Deserialize, Serialize};

/// One timestamped pupil/gaze sample as consumed by the acquisition
/// loop. Appended monotonically and never mutated after append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PupilSample {
    /// Unix seconds.
    pub timestamp: f64,
    /// Mean of the available per-eye diameters, millimetres.
    pub pupil_diameter: Option<f64>,
    /// Gaze x, either normalized [0,1] or raw pixel units.
    pub gaze_x: Option<f64>,
    /// Gaze y, either normalized [0,1] or raw pixel units.
    pub gaze_y: Option<f64>,
    /// Whether the device reports being worn.
    pub worn: Option<bool>,
}

/// Raw frame as emitted by the sensor. Per-eye diameters are collapsed
/// into one sample value.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceFrame {
    pub timestamp_unix_seconds: Option<f64>,
    pub pupil_diameter_left: Option<f64>,
    pub pupil_diameter_right: Option<f64>,
    pub gaze_x: Option<f64>,
    pub gaze_y: Option<f64>,
    pub worn: Option<bool>,
}

impl DeviceFrame {
    /// Collapse into a [`PupilSample`], falling back to wall-clock time
    /// when the frame carries no timestamp.
    pub fn into_sample(self) -> PupilSample {
        let timestamp = self
            .timestamp_unix_seconds
            .unwrap_or_else(crate::source::unix_now);
        PupilSample {
            timestamp,
            pupil_diameter: pick_pupil(self.pupil_diameter_left, self.pupil_diameter_right),
            gaze_x: self.gaze_x,
            gaze_y: self.gaze_y,
            worn: self.worn,
        }
    }
}

/// Mean of whichever per-eye diameters are present.
pub fn pick_pupil(left: Option<f64>, right: Option<f64>) -> Option<f64> {
    match (left, right) {
        (None, None) => None,
        (Some(l), None) => Some(l),
        (None, Some(r)) => Some(r),
        (Some(l), Some(r)) => Some((l + r) / 2.0),
    }
}
