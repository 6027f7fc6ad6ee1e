//! Phase scheduler and acquisition loop.
//!
//! One dedicated thread drives a session: it pulls samples from the
//! source, detects phase edges, publishes ticks and gaze updates,
//! polls the attention feed, and finalizes on every exit path by
//! extracting metrics, fusing scores, persisting the engagement
//! record and publishing exactly one `Done` event.

use crate::attention::{AttentionFeed, AttentionSample, SimulatedAttentionFeed, UnavailableAttentionFeed};
use crate::config::{SessionConfig, SessionConfigError};
use crate::context::SessionContext;
use crate::events::{EegStatus, Event, Phase, SessionResult, TickSnapshot};
use crate::session::{metrics, scoring};
use crate::source::{DeviceSource, PupilSample, SampleSource, SimulatedSource};
use crate::store::EngagementRecord;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Minimum spacing between `Tick` events, seconds of session time.
const TICK_INTERVAL: f64 = 1.0;
/// Minimum spacing between `Gaze` events.
const GAZE_INTERVAL: f64 = 0.05;
/// Attention feed poll cadence.
const ATTENTION_POLL_INTERVAL: f64 = 0.05;
/// Pause between device connection attempts.
const RETRY_BACKOFF: Duration = Duration::from_millis(300);

/// Outcome of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStatus {
    Started,
    /// Another session is active; nothing was changed.
    AlreadyRunning,
}

/// Validate the config and, if no session is active, launch the
/// acquisition loop on its own thread.
pub fn start_session(
    ctx: Arc<SessionContext>,
    config: SessionConfig,
    device_address: String,
) -> Result<StartStatus, SessionConfigError> {
    config.validate()?;

    if !ctx.try_begin_session() {
        return Ok(StartStatus::AlreadyRunning);
    }
    ctx.clear_results();
    ctx.clear_stop();

    std::thread::spawn(move || {
        let source = connect_source(&ctx, &config, &device_address);
        let attention: Box<dyn AttentionFeed> = if config.demo {
            Box::new(SimulatedAttentionFeed::new())
        } else {
            // The EEG pipeline is an external collaborator; without
            // one configured the session scores unmodulated.
            Box::new(UnavailableAttentionFeed)
        };
        run_acquisition(&ctx, &config, source, attention);
        ctx.end_session();
    });

    Ok(StartStatus::Started)
}

/// Connect to the pupil sensor, retrying with backoff, then fall back
/// to the simulator. Connectivity failures are never fatal.
fn connect_source(
    ctx: &SessionContext,
    config: &SessionConfig,
    address: &str,
) -> Box<dyn SampleSource> {
    if config.demo {
        ctx.bus.publish(Event::Log {
            msg: "running in demo mode (simulated pupil data)".to_string(),
        });
        return Box::new(SimulatedSource::new(config));
    }

    let retries = config.retries.max(1);
    for attempt in 1..=retries {
        ctx.bus.publish(Event::Log {
            msg: format!("connection attempt {attempt}/{retries}..."),
        });
        match DeviceSource::connect(address) {
            Ok(source) => {
                ctx.bus.publish(Event::Log {
                    msg: "connected to pupil sensor".to_string(),
                });
                return Box::new(source);
            }
            Err(e) => {
                tracing::warn!("sensor connection attempt {attempt} failed: {e}");
                ctx.bus.publish(Event::Log {
                    msg: format!("attempt {attempt} failed: {e}"),
                });
                std::thread::sleep(RETRY_BACKOFF);
            }
        }
    }

    tracing::warn!("sensor unreachable after {retries} attempts, using simulator");
    ctx.bus.publish(Event::Log {
        msg: "could not connect - switching to simulated mode".to_string(),
    });
    Box::new(SimulatedSource::new(config))
}

/// Run the acquisition loop to completion and finalize.
///
/// Public for in-process callers and tests that supply their own
/// source/feed; HTTP starts go through [`start_session`].
pub fn run_acquisition(
    ctx: &SessionContext,
    config: &SessionConfig,
    mut source: Box<dyn SampleSource>,
    mut attention: Box<dyn AttentionFeed>,
) {
    let session_id = Uuid::new_v4().to_string();
    let started_at_utc = Utc::now().to_rfc3339();
    let simulated = source.is_simulated();

    if let Err(e) = attention.start() {
        tracing::warn!("attention feed failed to start: {e}");
        ctx.bus.publish(Event::Log {
            msg: format!("attention feed failed to start: {e}"),
        });
    }

    ctx.bus.publish(Event::Phase {
        phase: Phase::Baseline,
        elapsed: 0.0,
    });

    let mut samples: Vec<PupilSample> = Vec::new();
    let mut t0: Option<f64> = None;
    let mut current_phase = Phase::Baseline;
    let mut last_tick = -TICK_INTERVAL;
    let mut last_gaze = f64::NEG_INFINITY;
    let mut last_attention_poll = f64::NEG_INFINITY;
    let mut latest_attention: Option<AttentionSample> = None;
    let mut attention_error_logged = false;
    let mut eeg_status = EegStatus::Unavailable;
    let mut final_elapsed = 0.0;

    loop {
        if ctx.stop_requested() {
            ctx.bus.publish(Event::Log {
                msg: "stop requested - ending acquisition early".to_string(),
            });
            break;
        }

        let sample = match source.receive_sample() {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!("sensor read failed, ending acquisition: {e}");
                ctx.bus.publish(Event::Log {
                    msg: format!("sensor read failed: {e} - ending acquisition"),
                });
                break;
            }
        };

        let t0_value = *t0.get_or_insert(sample.timestamp);
        let elapsed = sample.timestamp - t0_value;
        final_elapsed = elapsed;
        samples.push(sample.clone());

        if elapsed - last_attention_poll >= ATTENTION_POLL_INTERVAL {
            match attention.poll_latest() {
                Ok(Some(attention_sample)) => {
                    latest_attention = Some(attention_sample);
                    eeg_status = EegStatus::Ok;
                }
                Ok(None) => {}
                Err(e) => {
                    if latest_attention.is_none() {
                        eeg_status = EegStatus::Error;
                    }
                    // First error only; subsequent failures are expected
                    // to look identical.
                    if !attention_error_logged {
                        attention_error_logged = true;
                        tracing::warn!("attention poll failed: {e}");
                        ctx.bus.publish(Event::Log {
                            msg: format!("attention feed unavailable: {e}"),
                        });
                    }
                }
            }
            last_attention_poll = elapsed;
        }

        let phase = Phase::for_elapsed(elapsed, config.t_on, config.t_off);
        if phase != current_phase {
            current_phase = phase;
            ctx.bus.publish(Event::Phase {
                phase,
                elapsed: round2(elapsed),
            });
        }

        if elapsed - last_gaze >= GAZE_INTERVAL {
            ctx.bus.publish(Event::Gaze {
                elapsed: round2(elapsed),
                gaze_x: sample.gaze_x,
                gaze_y: sample.gaze_y,
                worn: sample.worn,
            });
            last_gaze = elapsed;
        }

        if elapsed - last_tick >= TICK_INTERVAL {
            let snapshot = TickSnapshot {
                phase: Some(current_phase),
                elapsed: round2(elapsed),
                pupil: sample.pupil_diameter.map(round4),
                samples_count: samples.len(),
                gaze_x: sample.gaze_x,
                gaze_y: sample.gaze_y,
                worn: sample.worn,
                eeg_score: latest_attention.map(|a| a.concentration_score),
                eeg_ratio: latest_attention.map(|a| a.alpha_theta_ratio),
                eeg_status,
            };
            ctx.update_snapshot(snapshot.clone());
            ctx.bus.publish(Event::Tick { snapshot });
            last_tick = elapsed;
        }

        if elapsed >= config.total_s {
            break;
        }
    }

    // Cleanup runs on every exit path before any metric work.
    source.close();
    attention.stop();

    let t0_value = t0.unwrap_or_else(crate::source::unix_now);
    let window_metrics = metrics::extract(&samples, t0_value, config);
    let engagement = scoring::fuse(&window_metrics, latest_attention.as_ref());

    let results = SessionResult {
        session_id: session_id.clone(),
        started_at_utc,
        simulated,
        baseline: window_metrics.baseline,
        pipr_6: window_metrics.pipr_6,
        pipr_30: window_metrics.pipr_30,
        light_min: window_metrics.light_min,
        n_base: window_metrics.n_base,
        n_pipr6: window_metrics.n_pipr6,
        n_pipr30: window_metrics.n_pipr30,
        n_light: window_metrics.n_light,
        engagement: engagement.clone(),
    };

    let record = EngagementRecord::from_engagement(&session_id, &engagement);
    match ctx.store.append(record, ctx.ema_alpha) {
        Ok(stored) => {
            tracing::info!(
                session_id = %session_id,
                score = stored.session_score,
                ema = stored.ema_score,
                "engagement record persisted"
            );
        }
        Err(e) => {
            // Losing a completed session's record silently would be
            // unacceptable; surface it on the bus as well.
            tracing::error!("failed to persist engagement record: {e}");
            ctx.bus.publish(Event::Log {
                msg: format!("failed to persist engagement record: {e}"),
            });
        }
    }

    let mut snapshot = ctx.snapshot();
    snapshot.phase = Some(Phase::Done);
    snapshot.elapsed = round2(final_elapsed);
    snapshot.samples_count = samples.len();
    ctx.update_snapshot(snapshot);

    ctx.set_results(results.clone());
    ctx.bus.publish(Event::Done { results });
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
