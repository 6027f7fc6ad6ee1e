//! Process-wide session context.
//!
//! One explicit object owns everything the HTTP handlers and the
//! acquisition loop share: the event bus, the latest tick snapshot,
//! the final results slot, the engagement store, and the
//! active-session / stop flags. It is constructed once at process
//! start and passed to every component; nothing is ambient.

use crate::bus::EventBus;
use crate::events::{SessionResult, TickSnapshot};
use crate::store::EngagementStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared state for the lifetime of the process. At most one
/// acquisition session is active at any time.
pub struct SessionContext {
    pub bus: EventBus,
    pub store: EngagementStore,
    /// Smoothing factor handed to the store on finalize.
    pub ema_alpha: f64,
    snapshot: Mutex<TickSnapshot>,
    results: Mutex<Option<SessionResult>>,
    running: AtomicBool,
    stop_requested: AtomicBool,
}

impl SessionContext {
    pub fn new(store: EngagementStore, ema_alpha: f64) -> Arc<Self> {
        Arc::new(Self {
            bus: EventBus::new(),
            store,
            ema_alpha,
            snapshot: Mutex::new(TickSnapshot::default()),
            results: Mutex::new(None),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        })
    }

    /// Copy of the latest tick snapshot. Non-blocking apart from the
    /// snapshot lock itself.
    pub fn snapshot(&self) -> TickSnapshot {
        self.lock(&self.snapshot).clone()
    }

    pub fn update_snapshot(&self, snapshot: TickSnapshot) {
        *self.lock(&self.snapshot) = snapshot;
    }

    /// Final results of the last completed session, if any.
    pub fn results(&self) -> Option<SessionResult> {
        self.lock(&self.results).clone()
    }

    pub fn set_results(&self, results: SessionResult) {
        *self.lock(&self.results) = Some(results);
    }

    pub fn clear_results(&self) {
        *self.lock(&self.results) = None;
    }

    /// Try to claim the single active-session slot. Returns false if a
    /// session is already running, leaving all state untouched.
    pub fn try_begin_session(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the active-session slot.
    pub fn end_session(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the acquisition loop to exit early. The loop still runs its
    /// finalize-and-publish sequence.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn clear_stop(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EngagementStore;

    fn context() -> Arc<SessionContext> {
        let dir = std::env::temp_dir().join("lumen-context-test");
        SessionContext::new(EngagementStore::new(dir.join("scores.json")), 0.3)
    }

    #[test]
    fn test_single_session_slot() {
        let ctx = context();
        assert!(ctx.try_begin_session());
        assert!(!ctx.try_begin_session());
        assert!(ctx.is_running());

        ctx.end_session();
        assert!(!ctx.is_running());
        assert!(ctx.try_begin_session());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let ctx = context();
        assert_eq!(ctx.snapshot().samples_count, 0);

        let mut snap = TickSnapshot::default();
        snap.samples_count = 42;
        snap.elapsed = 7.0;
        ctx.update_snapshot(snap);

        let read = ctx.snapshot();
        assert_eq!(read.samples_count, 42);
        assert_eq!(read.elapsed, 7.0);
    }

    #[test]
    fn test_stop_flag() {
        let ctx = context();
        assert!(!ctx.stop_requested());
        ctx.request_stop();
        assert!(ctx.stop_requested());
        ctx.clear_stop();
        assert!(!ctx.stop_requested());
    }
}
