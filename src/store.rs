//! Durable engagement history with EMA smoothing.
//!
//! One record is appended per completed session. The full record
//! sequence is serialized to a temporary file and atomically renamed
//! over the canonical path, so a concurrent reader always observes a
//! complete sequence. A malformed or unreadable store file is treated
//! as an empty history rather than a fatal error; only write failures
//! surface, since silently losing a completed session is unacceptable.

use crate::events::{EngagementResult, Metric, ScoreWeights};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Default smoothing factor for the longitudinal EMA.
pub const DEFAULT_EMA_ALPHA: f64 = 0.3;

/// Errors surfaced by [`EngagementStore::append`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write engagement store: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize engagement records: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One persisted engagement record.
///
/// `ema_score` depends only on the previous record and the smoothing
/// factor; both scores are rounded to 3 decimals on append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub session_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub session_score: f64,
    pub ema_score: f64,
    pub alpha: f64,
    pub pupil_response_score: Metric,
    pub recovery_score: Metric,
    pub attentiveness_score: Metric,
    pub eeg_concentration_score: Option<f64>,
    pub eeg_alpha_theta_ratio: Option<f64>,
    pub gaze_jitter_rms: Metric,
    pub retake_recommended: bool,
    pub weights: ScoreWeights,
    pub reasons: Vec<String>,
}

impl EngagementRecord {
    /// Build an unsmoothed record from a session's engagement result.
    /// `ema_score` and `alpha` are filled in by the store on append.
    pub fn from_engagement(session_id: &str, engagement: &EngagementResult) -> Self {
        Self {
            session_id: session_id.to_string(),
            timestamp_utc: Utc::now(),
            session_score: engagement.session_score,
            ema_score: 0.0,
            alpha: DEFAULT_EMA_ALPHA,
            pupil_response_score: engagement.pupil_response_score.clone(),
            recovery_score: engagement.recovery_score.clone(),
            attentiveness_score: engagement.attentiveness_score.clone(),
            eeg_concentration_score: engagement.eeg_concentration_score,
            eeg_alpha_theta_ratio: engagement.eeg_alpha_theta_ratio,
            gaze_jitter_rms: engagement.gaze_jitter_rms.clone(),
            retake_recommended: engagement.retake_recommended,
            weights: engagement.weights,
            reasons: engagement.reasons.clone(),
        }
    }
}

/// Append-only engagement record store backed by one JSON file.
///
/// Each read-modify-write cycle runs inside a single mutex span;
/// contention is one session completion at a time, so no finer
/// locking is warranted.
pub struct EngagementStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EngagementStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record, computing its EMA from the last stored record.
    ///
    /// `alpha` is clamped to [0.01, 1.0]. Returns the enriched record
    /// as persisted.
    pub fn append(
        &self,
        mut record: EngagementRecord,
        alpha: f64,
    ) -> Result<EngagementRecord, StoreError> {
        let alpha = alpha.clamp(0.01, 1.0);
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut records = self.read_unlocked();
        let prior_ema = records
            .last()
            .map(|last| clamp_score(last.ema_score))
            .filter(|v| v.is_finite());

        let score = clamp_score(record.session_score);
        let ema = match prior_ema {
            None => score,
            Some(prior) => clamp_score(alpha * score + (1.0 - alpha) * prior),
        };

        record.session_score = round3(score);
        record.ema_score = round3(ema);
        record.alpha = alpha;

        records.push(record.clone());
        self.write_unlocked(&records)?;
        Ok(record)
    }

    /// Last `limit` records in append order. `limit` is raised to at
    /// least 1.
    pub fn history(&self, limit: usize) -> Vec<EngagementRecord> {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let records = self.read_unlocked();
        let limit = limit.max(1);
        let skip = records.len().saturating_sub(limit);
        records.into_iter().skip(skip).collect()
    }

    fn read_unlocked(&self) -> Vec<EngagementRecord> {
        if !self.path.exists() {
            return Vec::new();
        }
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("engagement store unreadable, starting empty: {e}");
                return Vec::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("engagement store malformed, starting empty: {e}");
                Vec::new()
            }
        }
    }

    fn write_unlocked(&self, records: &[EngagementRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Metric;
    use pretty_assertions::assert_eq;

    fn record(score: f64) -> EngagementRecord {
        let engagement = EngagementResult {
            session_score: score,
            pupil_response_score: Metric::defined(score),
            recovery_score: Metric::undefined("pipr_30 undefined"),
            attentiveness_score: Metric::undefined("gaze jitter undefined"),
            eeg_concentration_score: None,
            eeg_alpha_theta_ratio: None,
            gaze_jitter_rms: Metric::undefined("fewer than 6 usable gaze samples"),
            retake_recommended: false,
            weights: ScoreWeights::default(),
            reasons: vec![],
        };
        EngagementRecord::from_engagement("test-session", &engagement)
    }

    fn temp_store() -> (tempfile::TempDir, EngagementStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = EngagementStore::new(dir.path().join("engagement_scores.json"));
        (dir, store)
    }

    #[test]
    fn test_ema_recurrence() {
        let (_dir, store) = temp_store();
        let scores = [40.0, 60.0, 50.0, 80.0, 20.0];
        let expected = [40.0, 46.0, 47.2, 57.04, 45.928];

        for (score, want) in scores.iter().zip(expected.iter()) {
            let stored = store.append(record(*score), 0.3).unwrap();
            assert_eq!(stored.ema_score, *want);
        }
    }

    #[test]
    fn test_first_record_ema_equals_score() {
        let (_dir, store) = temp_store();
        let stored = store.append(record(73.5), 0.3).unwrap();
        assert_eq!(stored.ema_score, 73.5);
        assert_eq!(stored.session_score, 73.5);
    }

    #[test]
    fn test_alpha_clamped() {
        let (_dir, store) = temp_store();
        let stored = store.append(record(50.0), 5.0).unwrap();
        assert_eq!(stored.alpha, 1.0);

        let stored = store.append(record(80.0), 0.0).unwrap();
        assert_eq!(stored.alpha, 0.01);
        // alpha 0.01: 0.01 * 80 + 0.99 * 50 = 50.3
        assert_eq!(stored.ema_score, 50.3);
    }

    #[test]
    fn test_score_clamped_to_range() {
        let (_dir, store) = temp_store();
        let stored = store.append(record(150.0), 0.3).unwrap();
        assert_eq!(stored.session_score, 100.0);
        let stored = store.append(record(-10.0), 1.0).unwrap();
        assert_eq!(stored.session_score, 0.0);
    }

    #[test]
    fn test_history_round_trip_preserves_order_and_fields() {
        let (_dir, store) = temp_store();
        for i in 0..4 {
            store.append(record(40.0 + i as f64), 0.3).unwrap();
        }

        let records = store.history(4);
        assert_eq!(records.len(), 4);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.session_score, 40.0 + i as f64);
            assert_eq!(r.session_id, "test-session");
            assert_eq!(r.weights, ScoreWeights::default());
            assert_eq!(
                r.recovery_score.reason(),
                Some("pipr_30 undefined"),
            );
        }
    }

    #[test]
    fn test_history_limit_takes_tail() {
        let (_dir, store) = temp_store();
        for i in 0..5 {
            store.append(record(i as f64), 0.3).unwrap();
        }
        let records = store.history(2);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].session_score, 3.0);
        assert_eq!(records[1].session_score, 4.0);

        // limit 0 is raised to 1
        assert_eq!(store.history(0).len(), 1);
    }

    #[test]
    fn test_malformed_store_treated_as_empty() {
        let (_dir, store) = temp_store();
        std::fs::write(store.path(), b"{ not json").unwrap();

        assert!(store.history(10).is_empty());

        // Appending over a corrupt file restarts the sequence.
        let stored = store.append(record(64.0), 0.3).unwrap();
        assert_eq!(stored.ema_score, 64.0);
        assert_eq!(store.history(10).len(), 1);
    }

    #[test]
    fn test_no_partial_file_visible_after_append() {
        let (_dir, store) = temp_store();
        store.append(record(55.0), 0.3).unwrap();

        // The canonical path parses as a complete record sequence.
        let content = std::fs::read_to_string(store.path()).unwrap();
        let parsed: Vec<EngagementRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
