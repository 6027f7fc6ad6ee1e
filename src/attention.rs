//! External attention feed boundary.
//!
//! The attention pipeline (EEG alpha/theta concentration scoring) is an
//! independent collaborator; the engine only polls it for the most
//! recent sample. A simulated feed backs demo mode; the unavailable
//! feed stands in when no hardware pipeline is configured, exercising
//! the degrade-gracefully path.

use crate::source::unix_now;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One sample from the attention pipeline. Only the most recent sample
/// is authoritative at each poll.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttentionSample {
    /// Unix seconds.
    pub timestamp: f64,
    /// Concentration in [0, 100].
    pub concentration_score: f64,
    /// Alpha/theta band power ratio, >= 0.
    pub alpha_theta_ratio: f64,
}

/// Errors from the attention collaborator.
#[derive(Debug, Error)]
pub enum AttentionError {
    #[error("attention feed unavailable: {0}")]
    Unavailable(String),
}

/// Pollable attention metric feed.
pub trait AttentionFeed: Send {
    fn start(&mut self) -> Result<(), AttentionError>;

    /// Most recent sample, or `None` if nothing has been produced yet.
    fn poll_latest(&mut self) -> Result<Option<AttentionSample>, AttentionError>;

    fn stop(&mut self);
}

/// Concentration score for an alpha/theta ratio, matching the scaling
/// used by the EEG pipeline: linear between the low and high ratio
/// anchors, clamped to [0, 100].
pub fn concentration_from_ratio(ratio: f64, ratio_low: f64, ratio_high: f64) -> f64 {
    let span = (ratio_high - ratio_low).max(1e-9);
    (100.0 * (ratio - ratio_low) / span).clamp(0.0, 100.0)
}

const RATIO_LOW: f64 = 0.6;
const RATIO_HIGH: f64 = 2.4;

/// Deterministic attention feed for demo mode: the alpha/theta ratio
/// wanders slowly inside the scoring anchors.
pub struct SimulatedAttentionFeed {
    started: bool,
    t0: f64,
}

impl SimulatedAttentionFeed {
    pub fn new() -> Self {
        Self {
            started: false,
            t0: 0.0,
        }
    }
}

impl Default for SimulatedAttentionFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl AttentionFeed for SimulatedAttentionFeed {
    fn start(&mut self) -> Result<(), AttentionError> {
        self.started = true;
        self.t0 = unix_now();
        Ok(())
    }

    fn poll_latest(&mut self) -> Result<Option<AttentionSample>, AttentionError> {
        if !self.started {
            return Ok(None);
        }
        let now = unix_now();
        let elapsed = now - self.t0;
        let ratio = 1.5 + 0.7 * (elapsed * 0.23).sin();
        Ok(Some(AttentionSample {
            timestamp: now,
            concentration_score: concentration_from_ratio(ratio, RATIO_LOW, RATIO_HIGH),
            alpha_theta_ratio: ratio,
        }))
    }

    fn stop(&mut self) {
        self.started = false;
    }
}

/// Feed used when no attention pipeline is configured. Every poll
/// fails; the scheduler logs the first failure and the session scores
/// without EEG modulation.
pub struct UnavailableAttentionFeed;

impl AttentionFeed for UnavailableAttentionFeed {
    fn start(&mut self) -> Result<(), AttentionError> {
        Ok(())
    }

    fn poll_latest(&mut self) -> Result<Option<AttentionSample>, AttentionError> {
        Err(AttentionError::Unavailable(
            "no attention pipeline configured".to_string(),
        ))
    }

    fn stop(&mut self) {}
}
