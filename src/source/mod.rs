//! Sample acquisition sources for the session engine.
//!
//! The acquisition loop reads from anything implementing
//! [`SampleSource`]: the network-attached pupil sensor
//! ([`device::DeviceSource`]) or the deterministic simulator
//! ([`simulated::SimulatedSource`]) used in demo mode and as the
//! connectivity fallback.

pub mod device;
pub mod simulated;
pub mod types;

pub use device::DeviceSource;
pub use simulated::{SimulatedSource, SAMPLE_RATE_HZ};
pub use types::{pick_pupil, DeviceFrame, PupilSample};

use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors at the sensor boundary.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("could not connect to sensor at {address}: {message}")]
    Connect { address: String, message: String },

    #[error("sensor stream ended")]
    Disconnected,

    #[error("sensor read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed sensor frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A blocking stream of pupil/gaze samples.
///
/// `receive_sample` is the only call that may block the acquisition
/// loop, bounded by device/simulator pacing.
pub trait SampleSource: Send {
    fn receive_sample(&mut self) -> Result<PupilSample, SourceError>;

    /// Release any underlying handle. Idempotent.
    fn close(&mut self);

    /// Whether samples are synthetic rather than from hardware.
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Current wall-clock time as Unix seconds.
pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
