//! Per-source activity tracking.
//!
//! Each source moves between two states, `inactive` (initial) and `active`:
//!
//! ```text
//!            mark_active (after a pass that processed lines)
//!   inactive ──────────────────────────────────────────────► active
//!      ▲                                                      │
//!      └──────────────── sweep: idle > threshold ─────────────┘
//! ```
//!
//! Each transition invokes the matching callback exactly once. Callbacks run
//! on a spawned task when a tokio runtime is available, and never while the
//! activity map is locked.
//!
//! Snapshots are never evicted: a source seen once keeps its bookkeeping for
//! the lifetime of the tracker.

use std::sync::Arc;
use std::time::Instant;

use lt_core::{ActivityConfig, ActivitySnapshot, FxHashMap, SourceId, fx_hash_map};
use parking_lot::Mutex;
use smallvec::SmallVec;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Callback invoked with the source that changed state.
pub type SourceCallback = Arc<dyn Fn(SourceId) + Send + Sync>;

/// Sources demoted by one sweep.
pub type Demoted = SmallVec<[SourceId; 4]>;

/// Tracks last activity and the active flag for every source.
pub struct ServerStateTracker {
    config: ActivityConfig,
    states: Mutex<FxHashMap<SourceId, ActivitySnapshot>>,
    on_active: Mutex<Option<SourceCallback>>,
    on_inactive: Mutex<Option<SourceCallback>>,
}

impl std::fmt::Debug for ServerStateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerStateTracker")
            .field("config", &self.config)
            .field("sources", &self.states.lock().len())
            .finish_non_exhaustive()
    }
}

impl ServerStateTracker {
    /// Creates a tracker with no sources.
    #[must_use]
    pub fn new(config: ActivityConfig) -> Self {
        Self {
            config,
            states: Mutex::new(fx_hash_map()),
            on_active: Mutex::new(None),
            on_inactive: Mutex::new(None),
        }
    }

    /// Registers the "became active" callback, replacing any previous one.
    pub fn on_source_active(&self, callback: impl Fn(SourceId) + Send + Sync + 'static) {
        *self.on_active.lock() = Some(Arc::new(callback));
    }

    /// Registers the "became inactive" callback, replacing any previous one.
    pub fn on_source_inactive(&self, callback: impl Fn(SourceId) + Send + Sync + 'static) {
        *self.on_inactive.lock() = Some(Arc::new(callback));
    }

    /// Marks `source` active, firing the active callback if it was inactive.
    pub fn mark_active(&self, source: &SourceId) {
        let now = now();
        let transitioned = {
            let mut states = self.states.lock();
            let snapshot = states
                .entry(source.clone())
                .or_insert_with(|| ActivitySnapshot::new(now));
            let was_active = snapshot.is_active;
            snapshot.is_active = true;
            !was_active
        };

        if transitioned {
            info!(source = %source, "Source became active");
            let callback = self.on_active.lock().clone();
            fire(callback, source.clone());
        }
    }

    /// Refreshes the last-activity time of `source`.
    pub fn update_activity(&self, source: &SourceId) {
        let now = now();
        self.states
            .lock()
            .entry(source.clone())
            .and_modify(|s| s.last_activity = now)
            .or_insert_with(|| ActivitySnapshot::new(now));
    }

    /// Demotes idle sources as of the current time.
    pub fn sweep(&self) -> Demoted {
        self.sweep_at(now())
    }

    /// Demotes every active source idle for longer than the threshold as of
    /// `now`, firing the inactive callback once per demotion.
    pub fn sweep_at(&self, now: Instant) -> Demoted {
        let threshold = self.config.inactivity_threshold();
        let demoted: Demoted = {
            let mut states = self.states.lock();
            states
                .iter_mut()
                .filter(|(_, s)| s.is_active && s.is_idle(now, threshold))
                .map(|(id, s)| {
                    s.is_active = false;
                    id.clone()
                })
                .collect()
        };

        if !demoted.is_empty() {
            let callback = self.on_inactive.lock().clone();
            for source in &demoted {
                info!(source = %source, "Source became inactive");
                fire(callback.clone(), source.clone());
            }
        }
        demoted
    }

    /// Returns `true` if `source` is currently active.
    #[must_use]
    pub fn is_active(&self, source: &SourceId) -> bool {
        self.states.lock().get(source).is_some_and(|s| s.is_active)
    }

    /// Returns a copy of the snapshot for `source`, if it was ever seen.
    #[must_use]
    pub fn snapshot(&self, source: &SourceId) -> Option<ActivitySnapshot> {
        self.states.lock().get(source).copied()
    }

    /// Number of sources with bookkeeping.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    /// Returns `true` if no source has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }

    /// Runs the periodic sweep until `cancel` fires.
    pub async fn run_sweeper(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        debug!(interval = ?self.config.sweep_interval(), "Activity sweeper started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }

        debug!("Activity sweeper stopped");
    }
}

// Follows tokio's clock so paused-time tests can advance it.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn fire(callback: Option<SourceCallback>, source: SourceId) {
    let Some(callback) = callback else {
        return;
    };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { callback(source) });
        }
        Err(_) => callback(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn tracker() -> ServerStateTracker {
        ServerStateTracker::new(ActivityConfig {
            sweep_interval_ms: 5_000,
            inactivity_threshold_ms: 10_000,
        })
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(SourceId) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_mark_active_fires_once() {
        let tracker = tracker();
        let (count, callback) = counter();
        tracker.on_source_active(callback);
        let alpha = SourceId::new("alpha");

        tracker.mark_active(&alpha);
        tracker.mark_active(&alpha);

        assert!(tracker.is_active(&alpha));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inactive_callback_fires_once_across_sweeps() {
        let tracker = tracker();
        let (count, callback) = counter();
        tracker.on_source_inactive(callback);
        let alpha = SourceId::new("alpha");

        tracker.mark_active(&alpha);
        tracker.update_activity(&alpha);
        let seen = tracker.snapshot(&alpha).unwrap().last_activity;

        assert!(tracker.sweep_at(seen + Duration::from_secs(10)).is_empty());
        assert!(tracker.is_active(&alpha));

        let demoted = tracker.sweep_at(seen + Duration::from_secs(11));
        assert_eq!(demoted.as_slice(), &[alpha.clone()]);
        assert!(!tracker.is_active(&alpha));

        assert!(tracker.sweep_at(seen + Duration::from_secs(16)).is_empty());
        assert!(tracker.sweep_at(seen + Duration::from_secs(21)).is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_update_activity_alone_does_not_activate() {
        let tracker = tracker();
        let alpha = SourceId::new("alpha");

        tracker.update_activity(&alpha);

        assert!(!tracker.is_active(&alpha));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_reactivation_fires_again() {
        let tracker = tracker();
        let (active, on_active) = counter();
        tracker.on_source_active(on_active);
        let alpha = SourceId::new("alpha");

        tracker.mark_active(&alpha);
        let seen = tracker.snapshot(&alpha).unwrap().last_activity;
        tracker.sweep_at(seen + Duration::from_secs(30));
        tracker.mark_active(&alpha);

        assert_eq!(active.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_demotes_idle_source() {
        let tracker = Arc::new(tracker());
        let (count, callback) = counter();
        tracker.on_source_inactive(callback);
        let alpha = SourceId::new("alpha");
        tracker.mark_active(&alpha);

        let cancel = CancellationToken::new();
        let sweeper = tokio::spawn(Arc::clone(&tracker).run_sweeper(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(!tracker.is_active(&alpha));

        cancel.cancel();
        sweeper.await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
