//! Windowed metric extraction over a finished sample history.
//!
//! Pure functions: given the frozen sample vector, the session origin
//! `t0` and the protocol timing, compute baseline/PIPR means, the
//! light-window minimum, and gaze jitter. Every window uses closed
//! (inclusive) bounds; an empty window yields an undefined metric with
//! a human-readable reason instead of a failure.

use crate::config::SessionConfig;
use crate::events::Metric;
use crate::source::PupilSample;

/// Minimum usable gaze points for a jitter estimate.
pub const MIN_JITTER_POINTS: usize = 6;

/// PIPR6 window relative to light offset, seconds.
const PIPR6_WINDOW: (f64, f64) = (5.0, 7.0);
/// PIPR30 window relative to light offset, seconds.
const PIPR30_WINDOW: (f64, f64) = (25.0, 35.0);

/// Output of the window extractor.
#[derive(Debug, Clone)]
pub struct WindowMetrics {
    pub baseline: Metric,
    pub pipr_6: Metric,
    pub pipr_30: Metric,
    pub light_min: Metric,
    pub n_base: usize,
    pub n_pipr6: usize,
    pub n_pipr30: usize,
    pub n_light: usize,
    pub gaze_jitter_rms: Metric,
}

/// Extract all windowed metrics from the finished sample history.
pub fn extract(samples: &[PupilSample], t0: f64, config: &SessionConfig) -> WindowMetrics {
    let base_window = (t0 + config.t_on - config.baseline_s, t0 + config.t_on);
    let pipr6_window = (t0 + config.t_off + PIPR6_WINDOW.0, t0 + config.t_off + PIPR6_WINDOW.1);
    let pipr30_window = (
        t0 + config.t_off + PIPR30_WINDOW.0,
        t0 + config.t_off + PIPR30_WINDOW.1,
    );
    let light_window = (t0 + config.t_on, t0 + config.t_off);

    let (baseline, n_base) = window_mean(samples, base_window, "no valid samples in baseline window");
    let (pipr6_mean, n_pipr6) = window_mean(samples, pipr6_window, "no valid samples in PIPR6 window");
    let (pipr30_mean, n_pipr30) =
        window_mean(samples, pipr30_window, "no valid samples in PIPR30 window");
    let (light_min, n_light) = window_min(samples, light_window, "no valid samples in light window");

    let pipr_6 = difference(&baseline, &pipr6_mean);
    let pipr_30 = difference(&baseline, &pipr30_mean);

    WindowMetrics {
        baseline,
        pipr_6,
        pipr_30,
        light_min,
        n_base,
        n_pipr6,
        n_pipr30,
        n_light,
        gaze_jitter_rms: gaze_jitter_rms(samples),
    }
}

/// Mean of non-null pupil values inside the closed window, plus the
/// count of samples (valid or not) falling in the window.
fn window_mean(samples: &[PupilSample], window: (f64, f64), empty_reason: &str) -> (Metric, usize) {
    let in_window: Vec<&PupilSample> = samples
        .iter()
        .filter(|s| s.timestamp >= window.0 && s.timestamp <= window.1)
        .collect();
    let values: Vec<f64> = in_window.iter().filter_map(|s| s.pupil_diameter).collect();

    let metric = if values.is_empty() {
        Metric::undefined(empty_reason)
    } else {
        Metric::defined(mean(&values))
    };
    (metric, in_window.len())
}

/// Minimum non-null pupil value inside the closed window.
fn window_min(samples: &[PupilSample], window: (f64, f64), empty_reason: &str) -> (Metric, usize) {
    let in_window: Vec<&PupilSample> = samples
        .iter()
        .filter(|s| s.timestamp >= window.0 && s.timestamp <= window.1)
        .collect();
    let min = in_window
        .iter()
        .filter_map(|s| s.pupil_diameter)
        .fold(None::<f64>, |acc, v| {
            Some(acc.map_or(v, |m| m.min(v)))
        });

    let metric = match min {
        Some(v) => Metric::defined(v),
        None => Metric::undefined(empty_reason),
    };
    (metric, in_window.len())
}

/// `a - b`, undefined when either operand is undefined (the first
/// undefined operand's reason wins).
fn difference(a: &Metric, b: &Metric) -> Metric {
    match (a.value(), b.value()) {
        (Some(a), Some(b)) => Metric::defined(a - b),
        _ => {
            let reason = a
                .reason()
                .or_else(|| b.reason())
                .unwrap_or("operand undefined");
            Metric::undefined(reason)
        }
    }
}

/// Root-mean-square of frame-to-frame displacement over the normalized
/// gaze trace. Requires [`MIN_JITTER_POINTS`] usable points.
pub fn gaze_jitter_rms(samples: &[PupilSample]) -> Metric {
    let points = normalized_gaze_trace(samples);
    if points.len() < MIN_JITTER_POINTS {
        return Metric::undefined(format!(
            "fewer than {MIN_JITTER_POINTS} usable gaze samples"
        ));
    }

    let square_sum: f64 = points
        .windows(2)
        .map(|pair| {
            let dx = pair[1].0 - pair[0].0;
            let dy = pair[1].1 - pair[0].1;
            dx * dx + dy * dy
        })
        .sum();
    let rms = (square_sum / (points.len() - 1) as f64).sqrt();
    Metric::defined(rms)
}

/// Gaze trace restricted to worn samples with both coordinates, mapped
/// into [0,1]. Traces already in [0,1] pass through untouched; raw
/// pixel traces are min-max normalized per axis.
fn normalized_gaze_trace(samples: &[PupilSample]) -> Vec<(f64, f64)> {
    let points: Vec<(f64, f64)> = samples
        .iter()
        .filter(|s| s.worn != Some(false))
        .filter_map(|s| match (s.gaze_x, s.gaze_y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        })
        .collect();

    let already_normalized = points
        .iter()
        .all(|&(x, y)| (0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y));
    if already_normalized {
        return points;
    }

    let (min_x, max_x) = axis_bounds(points.iter().map(|p| p.0));
    let (min_y, max_y) = axis_bounds(points.iter().map(|p| p.1));
    points
        .iter()
        .map(|&(x, y)| (normalize(x, min_x, max_x), normalize(y, min_y, max_y)))
        .collect()
}

fn axis_bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

/// Min-max normalize one coordinate. A degenerate axis (zero span)
/// maps to the trace centre.
fn normalize(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    if span <= f64::EPSILON {
        0.5
    } else {
        (value - min) / span
    }
}

/// Arithmetic mean of a non-empty slice.
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(timestamp: f64, pupil: Option<f64>) -> PupilSample {
        PupilSample {
            timestamp,
            pupil_diameter: pupil,
            gaze_x: None,
            gaze_y: None,
            worn: None,
        }
    }

    fn gaze_sample(timestamp: f64, x: f64, y: f64, worn: Option<bool>) -> PupilSample {
        PupilSample {
            timestamp,
            pupil_diameter: None,
            gaze_x: Some(x),
            gaze_y: Some(y),
            worn,
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            t_on: 5.0,
            t_off: 15.0,
            total_s: 55.0,
            baseline_s: 2.0,
            retries: 5,
            demo: true,
        }
    }

    #[test]
    fn test_window_edges_are_inclusive() {
        let t0 = 100.0;
        let cfg = config();
        // Baseline window is [103, 105]; a sample at exactly t0 + t_on
        // belongs to it.
        let samples = vec![
            sample(102.99, Some(9.0)),  // just before
            sample(103.0, Some(5.0)),   // lower edge
            sample(104.0, Some(6.0)),   // interior
            sample(105.0, Some(7.0)),   // upper edge, exactly t0 + t_on
            sample(105.01, Some(9.0)),  // just after
        ];
        let metrics = extract(&samples, t0, &cfg);
        assert_eq!(metrics.baseline.value(), Some(6.0));
        assert_eq!(metrics.n_base, 3);
    }

    #[test]
    fn test_null_pupils_counted_but_not_averaged() {
        let t0 = 0.0;
        let cfg = config();
        let samples = vec![
            sample(3.5, Some(4.0)),
            sample(4.0, None),
            sample(4.5, Some(6.0)),
        ];
        let metrics = extract(&samples, t0, &cfg);
        assert_eq!(metrics.baseline.value(), Some(5.0));
        assert_eq!(metrics.n_base, 3);
    }

    #[test]
    fn test_empty_window_has_reason() {
        let cfg = config();
        let metrics = extract(&[], 0.0, &cfg);
        assert_eq!(
            metrics.baseline.reason(),
            Some("no valid samples in baseline window")
        );
        assert_eq!(metrics.n_base, 0);
        // Derived differences inherit undefinedness.
        assert!(!metrics.pipr_6.is_defined());
        assert!(!metrics.pipr_30.is_defined());
        assert!(!metrics.light_min.is_defined());
    }

    #[test]
    fn test_pipr_differences() {
        let t0 = 0.0;
        let cfg = config();
        let mut samples = vec![
            // Baseline [3, 5]: mean 5.0
            sample(4.0, Some(5.0)),
            // PIPR6 [20, 22]: mean 4.0
            sample(21.0, Some(4.0)),
            // PIPR30 [40, 50]: mean 4.4
            sample(42.0, Some(4.2)),
            sample(48.0, Some(4.6)),
        ];
        // Light window [5, 15]: min 3.1
        samples.push(sample(8.0, Some(3.4)));
        samples.push(sample(12.0, Some(3.1)));

        let metrics = extract(&samples, t0, &cfg);
        assert_eq!(metrics.pipr_6.value(), Some(1.0));
        let pipr30 = metrics.pipr_30.value().unwrap();
        assert!((pipr30 - 0.6).abs() < 1e-12);
        assert_eq!(metrics.light_min.value(), Some(3.1));
        assert_eq!(metrics.n_light, 2);
    }

    #[test]
    fn test_jitter_requires_six_points() {
        let samples: Vec<PupilSample> = (0..5)
            .map(|i| gaze_sample(i as f64, 0.5, 0.5, Some(true)))
            .collect();
        let jitter = gaze_jitter_rms(&samples);
        assert_eq!(
            jitter.reason(),
            Some("fewer than 6 usable gaze samples")
        );
    }

    #[test]
    fn test_jitter_constant_gaze_is_zero() {
        let samples: Vec<PupilSample> = (0..10)
            .map(|i| gaze_sample(i as f64, 0.4, 0.6, Some(true)))
            .collect();
        assert_eq!(gaze_jitter_rms(&samples).value(), Some(0.0));
    }

    #[test]
    fn test_jitter_known_displacements() {
        // Alternating between two points 0.1 apart in x: every
        // consecutive displacement is 0.1, so the RMS is 0.1.
        let samples: Vec<PupilSample> = (0..8)
            .map(|i| {
                let x = if i % 2 == 0 { 0.4 } else { 0.5 };
                gaze_sample(i as f64, x, 0.5, Some(true))
            })
            .collect();
        let rms = gaze_jitter_rms(&samples).value().unwrap();
        assert!((rms - 0.1).abs() < 1e-12, "rms {rms}");
    }

    #[test]
    fn test_not_worn_points_excluded() {
        let mut samples: Vec<PupilSample> = (0..6)
            .map(|i| gaze_sample(i as f64, 0.5, 0.5, Some(true)))
            .collect();
        // A wild excursion while the device is off the face must not
        // contribute to jitter.
        samples.push(gaze_sample(6.0, 0.0, 0.0, Some(false)));
        assert_eq!(gaze_jitter_rms(&samples).value(), Some(0.0));
    }

    #[test]
    fn test_raw_pixel_trace_is_normalized() {
        // Pixel-unit trace spanning 100..300 x, 50..150 y. After
        // per-axis min-max normalization both traces sweep [0,1].
        let samples: Vec<PupilSample> = (0..6)
            .map(|i| {
                let f = i as f64 / 5.0;
                gaze_sample(i as f64, 100.0 + 200.0 * f, 50.0 + 100.0 * f, Some(true))
            })
            .collect();
        let rms = gaze_jitter_rms(&samples).value().unwrap();
        // Each normalized step is (0.2, 0.2), displacement 0.2*sqrt(2).
        let expected = 0.2 * 2f64.sqrt();
        assert!((rms - expected).abs() < 1e-12, "rms {rms}");
    }

    #[test]
    fn test_degenerate_axis_does_not_blow_up() {
        // Raw pixel x varies, y constant: y span is zero and maps to
        // the centre instead of dividing by zero.
        let samples: Vec<PupilSample> = (0..6)
            .map(|i| gaze_sample(i as f64, 100.0 + 10.0 * i as f64, 200.0, Some(true)))
            .collect();
        let rms = gaze_jitter_rms(&samples).value().unwrap();
        assert!(rms.is_finite());
    }
}
