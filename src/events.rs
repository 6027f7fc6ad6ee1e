//! Event and result types shared across the session engine.
//!
//! Everything that crosses a thread or the HTTP boundary lives here:
//! the tagged [`Event`] sum type delivered through the bus, the
//! [`Metric`] optional-with-reason type used for windowed results, and
//! the final [`SessionResult`] payload.

use serde::{Deserialize, Serialize};

/// Protocol phase of a running session.
///
/// `Done` is terminal and entered exactly once, when the acquisition
/// loop exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Baseline,
    LightOn,
    PostLight,
    Done,
}

impl Phase {
    /// Phase implied by elapsed time since session start.
    ///
    /// Evaluated every loop iteration; the scheduler publishes a
    /// `Phase` event only on edges.
    pub fn for_elapsed(elapsed: f64, t_on: f64, t_off: f64) -> Phase {
        if elapsed >= t_off {
            Phase::PostLight
        } else if elapsed >= t_on {
            Phase::LightOn
        } else {
            Phase::Baseline
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Baseline => "BASELINE",
            Phase::LightOn => "LIGHT_ON",
            Phase::PostLight => "POST_LIGHT",
            Phase::Done => "DONE",
        };
        f.write_str(s)
    }
}

/// A numeric result that is either defined or carries the reason it
/// could not be computed (empty window, too few gaze points, ...).
///
/// Serialized untagged: `{"value": 4.82}` or `{"reason": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    Defined { value: f64 },
    Undefined { reason: String },
}

impl Metric {
    pub fn defined(value: f64) -> Self {
        Metric::Defined { value }
    }

    pub fn undefined(reason: impl Into<String>) -> Self {
        Metric::Undefined {
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Defined { value } => Some(*value),
            Metric::Undefined { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Metric::Defined { .. } => None,
            Metric::Undefined { reason } => Some(reason),
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Metric::Defined { .. })
    }
}

/// Availability of the external attention (EEG) feed as seen by the
/// acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EegStatus {
    /// No sample observed yet (or no feed configured).
    Unavailable,
    /// At least one sample has been received.
    Ok,
    /// The feed reported an error; the loop keeps running.
    Error,
}

/// Latest tick fields, shared between the `Tick` event and the
/// non-blocking `/status` snapshot.
///
/// `phase` is `None` until a session has started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub phase: Option<Phase>,
    pub elapsed: f64,
    pub pupil: Option<f64>,
    pub samples_count: usize,
    pub gaze_x: Option<f64>,
    pub gaze_y: Option<f64>,
    pub worn: Option<bool>,
    pub eeg_score: Option<f64>,
    pub eeg_ratio: Option<f64>,
    pub eeg_status: EegStatus,
}

impl Default for TickSnapshot {
    fn default() -> Self {
        Self {
            phase: None,
            elapsed: 0.0,
            pupil: None,
            samples_count: 0,
            gaze_x: None,
            gaze_y: None,
            worn: None,
            eeg_score: None,
            eeg_ratio: None,
            eeg_status: EegStatus::Unavailable,
        }
    }
}

/// Weights applied to the engagement sub-scores before renormalization
/// over the defined subset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub pupil_response: f64,
    pub recovery: f64,
    pub attentiveness: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            pupil_response: 0.65,
            recovery: 0.25,
            attentiveness: 0.10,
        }
    }
}

/// Composite engagement output of the score-fusion step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementResult {
    /// Final composite score in [0, 100].
    pub session_score: f64,
    pub pupil_response_score: Metric,
    pub recovery_score: Metric,
    pub attentiveness_score: Metric,
    pub eeg_concentration_score: Option<f64>,
    pub eeg_alpha_theta_ratio: Option<f64>,
    pub gaze_jitter_rms: Metric,
    pub retake_recommended: bool,
    pub weights: ScoreWeights,
    /// Human-readable notes accumulated during fusion (missing inputs,
    /// low stimulus amplitude, retake rationale, ...).
    pub reasons: Vec<String>,
}

/// Final metrics for one completed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: String,
    pub started_at_utc: String,
    /// True when any part of the stream came from the simulator
    /// (demo mode or connectivity fallback).
    pub simulated: bool,
    pub baseline: Metric,
    pub pipr_6: Metric,
    pub pipr_30: Metric,
    pub light_min: Metric,
    pub n_base: usize,
    pub n_pipr6: usize,
    pub n_pipr30: usize,
    pub n_light: usize,
    pub engagement: EngagementResult,
}

/// A structured event published by the acquisition loop.
///
/// Closed sum type; the HTTP transport serializes it with a `"type"`
/// discriminator and handles every variant exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Operator-facing progress message.
    Log { msg: String },
    /// Phase edge, emitted exactly once per transition.
    Phase { phase: Phase, elapsed: f64 },
    /// Periodic snapshot, emitted at >= 1.0 s spacing.
    Tick {
        #[serde(flatten)]
        snapshot: TickSnapshot,
    },
    /// High-rate gaze update, emitted at >= 0.05 s spacing.
    Gaze {
        elapsed: f64,
        gaze_x: Option<f64>,
        gaze_y: Option<f64>,
        worn: Option<bool>,
    },
    /// Terminal event carrying the full session result.
    Done { results: SessionResult },
    /// Sentinel returned by the bus when a blocking read expires.
    Timeout,
    /// Several queued events delivered in one long-poll response.
    Batch { events: Vec<Event> },
}
