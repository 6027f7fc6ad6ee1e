//! Score fusion: sub-scores from windowed metrics, weighted into one
//! composite engagement score, optionally modulated by the external
//! attention signal.
//!
//! Undefined sub-scores are missing inputs, not failures: their
//! weights are renormalized away and their reasons carried into the
//! result.

use crate::attention::AttentionSample;
use crate::events::{EngagementResult, Metric, ScoreWeights};
use crate::session::metrics::WindowMetrics;

/// Constriction below this amplitude suggests the stimulus was too
/// weak; noted as a reason, never invalidates the score.
const MIN_CONSTRICTION_MM: f64 = 0.05;

/// Full-scale constriction amplitude in millimetres, after the 0.2 mm
/// dead zone.
const CONSTRICTION_SPAN_MM: f64 = 2.0;
const CONSTRICTION_DEAD_ZONE_MM: f64 = 0.2;

/// PIPR30 value mapping to a full recovery score.
const RECOVERY_SPAN_MM: f64 = 1.2;

/// Jitter RMS mapping to zero attentiveness.
const JITTER_SPAN: f64 = 0.08;

/// Focus mismatch above this triggers a retake recommendation.
const RETAKE_MISMATCH_THRESHOLD: f64 = 0.45;

/// Fuse windowed metrics and the latest attention sample (if any was
/// observed during the session) into an [`EngagementResult`].
pub fn fuse(metrics: &WindowMetrics, attention: Option<&AttentionSample>) -> EngagementResult {
    let mut reasons: Vec<String> = Vec::new();

    let pupil_response_score = pupil_response_score(metrics, &mut reasons);
    let recovery_score = recovery_score(metrics);
    let attentiveness_score = attentiveness_score(metrics);

    for metric in [&pupil_response_score, &recovery_score, &attentiveness_score] {
        if let Some(reason) = metric.reason() {
            reasons.push(reason.to_string());
        }
    }

    let weights = ScoreWeights::default();
    let base = base_score(
        &pupil_response_score,
        &recovery_score,
        &attentiveness_score,
        &weights,
        &mut reasons,
    );

    let mut retake_recommended = false;
    let (session_score, eeg_concentration_score, eeg_alpha_theta_ratio) = match attention {
        Some(sample) => {
            let adjustment = eeg_adjustment(
                sample,
                &pupil_response_score,
                &recovery_score,
                &attentiveness_score,
                &mut retake_recommended,
                &mut reasons,
            );
            let score = 100.0 * clamp01((base / 100.0) * adjustment);
            (
                score,
                Some(sample.concentration_score),
                Some(sample.alpha_theta_ratio),
            )
        }
        None => {
            reasons.push(
                "no EEG attention data observed; session score is the unmodulated base score"
                    .to_string(),
            );
            (base, None, None)
        }
    };

    EngagementResult {
        session_score,
        pupil_response_score,
        recovery_score,
        attentiveness_score,
        eeg_concentration_score,
        eeg_alpha_theta_ratio,
        gaze_jitter_rms: metrics.gaze_jitter_rms.clone(),
        retake_recommended,
        weights,
        reasons,
    }
}

/// `100 * clamp((baseline - light_min - 0.2) / 2.0, 0, 1)`.
fn pupil_response_score(metrics: &WindowMetrics, reasons: &mut Vec<String>) -> Metric {
    match (metrics.baseline.value(), metrics.light_min.value()) {
        (Some(baseline), Some(light_min)) => {
            let amplitude = baseline - light_min;
            if amplitude < MIN_CONSTRICTION_MM {
                reasons.push(format!(
                    "constriction amplitude {amplitude:.3} mm below {MIN_CONSTRICTION_MM} mm; stimulus intensity may have been too low"
                ));
            }
            Metric::defined(
                100.0 * clamp01((amplitude - CONSTRICTION_DEAD_ZONE_MM) / CONSTRICTION_SPAN_MM),
            )
        }
        _ => Metric::undefined(format!(
            "pupil response score unavailable: {}",
            metrics
                .baseline
                .reason()
                .or_else(|| metrics.light_min.reason())
                .unwrap_or("baseline or light minimum undefined")
        )),
    }
}

/// `100 * clamp(pipr_30 / 1.2, 0, 1)`.
fn recovery_score(metrics: &WindowMetrics) -> Metric {
    match metrics.pipr_30.value() {
        Some(pipr_30) => Metric::defined(100.0 * clamp01(pipr_30 / RECOVERY_SPAN_MM)),
        None => Metric::undefined(format!(
            "recovery score unavailable: {}",
            metrics.pipr_30.reason().unwrap_or("pipr_30 undefined")
        )),
    }
}

/// `100 * (1 - clamp(gaze_jitter_rms / 0.08, 0, 1))`.
fn attentiveness_score(metrics: &WindowMetrics) -> Metric {
    match metrics.gaze_jitter_rms.value() {
        Some(jitter) => Metric::defined(100.0 * (1.0 - clamp01(jitter / JITTER_SPAN))),
        None => Metric::undefined(format!(
            "attentiveness score unavailable: {}",
            metrics
                .gaze_jitter_rms
                .reason()
                .unwrap_or("gaze jitter undefined")
        )),
    }
}

/// Weighted mean over the defined sub-scores, weights renormalized to
/// sum to 1 over the defined subset. Zero when nothing is defined.
fn base_score(
    pupil_response: &Metric,
    recovery: &Metric,
    attentiveness: &Metric,
    weights: &ScoreWeights,
    reasons: &mut Vec<String>,
) -> f64 {
    let weighted = [
        (pupil_response.value(), weights.pupil_response),
        (recovery.value(), weights.recovery),
        (attentiveness.value(), weights.attentiveness),
    ];

    let mut acc = 0.0;
    let mut weight_sum = 0.0;
    for (value, weight) in weighted {
        if let Some(v) = value {
            acc += v * weight;
            weight_sum += weight;
        }
    }

    if weight_sum > 0.0 {
        acc / weight_sum
    } else {
        reasons.push("all sub-scores undefined; base score set to 0".to_string());
        0.0
    }
}

/// Multiplicative EEG adjustment in [0.6, 1.35].
fn eeg_adjustment(
    sample: &AttentionSample,
    pupil_response: &Metric,
    recovery: &Metric,
    attentiveness: &Metric,
    retake_recommended: &mut bool,
    reasons: &mut Vec<String>,
) -> f64 {
    let eeg_norm = clamp01(sample.concentration_score / 100.0);
    let gaze_norm = attentiveness
        .value()
        .map(|v| clamp01(v / 100.0))
        .unwrap_or(0.0);

    let focus_match = eeg_norm * gaze_norm;
    let focus_mismatch = eeg_norm * (1.0 - gaze_norm);

    let direction_signal = {
        let terms: Vec<f64> = [pupil_response.value(), recovery.value()]
            .into_iter()
            .flatten()
            .map(|v| ((v - 50.0) / 50.0).clamp(-1.0, 1.0))
            .collect();
        if terms.is_empty() {
            0.0
        } else {
            terms.iter().sum::<f64>() / terms.len() as f64
        }
    };

    let boost = direction_signal.max(0.0) * (0.12 + 0.28 * focus_match);
    let penalty =
        (-direction_signal).max(0.0) * (0.12 + 0.28 * focus_match) + 0.36 * focus_mismatch;

    if focus_mismatch > RETAKE_MISMATCH_THRESHOLD {
        *retake_recommended = true;
        reasons.push(format!(
            "high EEG concentration with unstable gaze (focus mismatch {focus_mismatch:.2}); a retake is recommended"
        ));
    }

    (1.0 + boost - penalty).clamp(0.6, 1.35)
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
