//! Deterministic simulated pupil stream.
//!
//! Physiological caricature: ~5 mm baseline with slow drift,
//! constriction to ~3 mm during the light stimulus, then exponential
//! recovery with a sustained residual after light offset. Sample
//! values are a pure function of elapsed time, so a given protocol
//! always produces the same trace.

use crate::config::SessionConfig;
use crate::source::types::PupilSample;
use crate::source::{unix_now, SampleSource, SourceError};
use std::time::Duration;

/// Simulated acquisition rate.
pub const SAMPLE_RATE_HZ: f64 = 30.0;

/// Simulator standing in for the pupil sensor.
pub struct SimulatedSource {
    t_on: f64,
    t_off: f64,
    t0: f64,
    tick: u64,
    paced: bool,
}

impl SimulatedSource {
    /// Real-time simulator pacing at [`SAMPLE_RATE_HZ`].
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_pacing(config, true)
    }

    /// Simulator that emits as fast as the caller pulls, with
    /// synthetic timestamps still spaced at the sample rate. For tests
    /// and offline replays.
    pub fn unpaced(config: &SessionConfig) -> Self {
        Self::with_pacing(config, false)
    }

    fn with_pacing(config: &SessionConfig, paced: bool) -> Self {
        Self {
            t_on: config.t_on,
            t_off: config.t_off,
            t0: unix_now(),
            tick: 0,
            paced,
        }
    }
}

impl SampleSource for SimulatedSource {
    fn receive_sample(&mut self) -> Result<PupilSample, SourceError> {
        if self.paced && self.tick > 0 {
            std::thread::sleep(Duration::from_secs_f64(1.0 / SAMPLE_RATE_HZ));
        }
        let elapsed = self.tick as f64 / SAMPLE_RATE_HZ;
        self.tick += 1;

        Ok(PupilSample {
            timestamp: self.t0 + elapsed,
            pupil_diameter: Some(simulated_pupil(elapsed, self.t_on, self.t_off)),
            gaze_x: Some(0.5 + 0.012 * (elapsed * 4.1).sin()),
            gaze_y: Some(0.5 + 0.012 * (elapsed * 3.3).cos()),
            worn: Some(true),
        })
    }

    fn close(&mut self) {}

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Pupil diameter in millimetres at `elapsed` seconds into the
/// protocol.
fn simulated_pupil(elapsed: f64, t_on: f64, t_off: f64) -> f64 {
    let base = 5.0 + 0.25 * (elapsed * 0.35).sin();
    if elapsed < t_on {
        return base;
    }
    if elapsed < t_off {
        let frac = ((elapsed - t_on) / 1.5).min(1.0);
        return base - frac * 2.0 + 0.12 * (elapsed * 3.1).sin();
    }
    // Post-light: recovery toward baseline with a melanopsin-like
    // sustained residual.
    let tau = (elapsed - t_off) / 28.0;
    let residual = 1.1 * (-tau).exp();
    base - residual + 0.08 * (elapsed * 2.3).sin()
}
