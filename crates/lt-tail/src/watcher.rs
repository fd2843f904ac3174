//! The orchestrator: file-system subscription, per-source workers, sweeper.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── notify thread ─────────────────────────────┐
//! │  RecommendedWatcher ──► Debouncer (debounce_ms) ──► callback (filter)  │
//! └───────────────────────────────────────────────────────────┬────────────┘
//!                                              blocking_send  │ ChangedPaths
//!                                                             ▼
//! ┌──────────────────────────── tokio runtime ─────────────────────────────┐
//! │  event loop ──► SourceId::from_path ──► SourceQueues::enqueue          │
//! │                                              │                         │
//! │                         ┌────────────────────┼──────────────────┐      │
//! │                         ▼                    ▼                  ▼      │
//! │                   worker "alpha"       worker "bravo"        ...       │
//! │                   (one read pass at a time, in signal order)           │
//! │                                                                        │
//! │  sweeper ──► ServerStateTracker::sweep every sweep_interval            │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Read pass
//!
//! For each dequeued signal a worker:
//!
//! 1. Loads the persisted [`SourceWatchState`]. A missing entry aborts the
//!    pass; the registry is never repaired here.
//! 2. On its first pass, if the state shows first contact, tries startup
//!    catch-up and persists the resulting offset.
//! 3. Checks rotation, then whether anything is new. A brand-new source is
//!    baselined at the current end of file, at most once per worker.
//! 4. Delivers every complete new line to the [`LineApplier`] in real-time
//!    mode and, if at least one line was consumed, persists the new offset
//!    and creation marker and reports activity.
//!
//! # Lifecycle
//!
//! ```no_run
//! use std::sync::Arc;
//! use lt_core::Config;
//! use lt_tail::{MemoryStateStore, Watcher};
//! # use lt_core::{ApplyContext, ApplyError, LineApplier};
//! # struct Printer;
//! # #[async_trait::async_trait]
//! # impl LineApplier for Printer {
//! #     async fn apply(&self, _: &ApplyContext, _: &str) -> Result<(), ApplyError> { Ok(()) }
//! # }
//!
//! # async fn example() -> Result<(), lt_tail::TailError> {
//! let mut watcher = Watcher::builder(
//!     Config::default(),
//!     Arc::new(MemoryStateStore::new()),
//!     Arc::new(Printer),
//! )
//! .build()?;
//!
//! watcher.on_source_inactive(|source| tracing::info!(%source, "server went quiet"));
//! watcher.add_path("/srv/game/logs")?;
//! watcher.start().await?;
//! // ...
//! watcher.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use lt_core::{
    ApplyContext, Config, LineApplier, LivenessProbe, SessionRepository, SourceId,
    SourceWatchState, StateStore, WatchConfig,
};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::activity::ServerStateTracker;
use crate::catchup::{CatchupOutcome, CatchupProcessor};
use crate::error::TailError;
use crate::events::{ChangeSignal, ChangedPaths, SignalKind};
use crate::filter::{FileFilter, LogFileFilter};
use crate::markers::extract_creation_marker;
use crate::queue::{EnqueueOutcome, SourceQueues};
use crate::reader::apply_lines;
use crate::rotation::{RotationDetector, SkipDecision};

/// Summary of one read pass, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Set when this pass performed startup catch-up.
    pub catchup: Option<CatchupOutcome>,
    /// Whether rotation was detected.
    pub rotated: bool,
    /// Whether the pass stopped before reading (baseline or nothing new).
    pub skipped: bool,
    /// Complete lines consumed in real-time mode.
    pub lines: usize,
    /// Lines the applier rejected.
    pub failed: usize,
    /// Offset the source is at after the pass.
    pub offset: u64,
}

/// State shared by the event loop and every worker.
struct Shared {
    watch: WatchConfig,
    store: Arc<dyn StateStore>,
    applier: Arc<dyn LineApplier>,
    catchup: Option<CatchupProcessor>,
    rotation: RotationDetector,
    tracker: Arc<ServerStateTracker>,
    queues: SourceQueues,
    cancel: CancellationToken,
}

impl Shared {
    fn dispatch_path(self: &Arc<Self>, path: Utf8PathBuf) -> Result<EnqueueOutcome, TailError> {
        let source =
            SourceId::from_path(&path).ok_or_else(|| TailError::UnresolvableSource(path.clone()))?;
        Ok(self.enqueue(ChangeSignal::changed(source, path)))
    }

    fn enqueue(self: &Arc<Self>, signal: ChangeSignal) -> EnqueueOutcome {
        let shared = Arc::clone(self);
        let source = signal.source_id.clone();
        self.queues.enqueue(signal, move |rx| {
            tokio::spawn(SourceWorker::new(shared, source).run(rx))
        })
    }
}

struct Running {
    debouncer: Debouncer<RecommendedWatcher>,
    event_loop: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

/// Tails every log under the added paths with strict per-source ordering.
///
/// Built with [`Watcher::builder`]. Dropping a running watcher cancels its
/// tasks without waiting for them; call [`stop`](Self::stop) for an orderly
/// shutdown.
pub struct Watcher {
    shared: Arc<Shared>,
    filter: Arc<dyn FileFilter>,
    paths: Vec<Utf8PathBuf>,
    running: Option<Running>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("paths", &self.paths)
            .field("sources", &self.shared.queues.len())
            .field("catchup", &self.shared.catchup.is_some())
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Starts building a watcher around the required collaborators.
    #[must_use]
    pub fn builder(
        config: Config,
        store: Arc<dyn StateStore>,
        applier: Arc<dyn LineApplier>,
    ) -> WatcherBuilder {
        WatcherBuilder {
            config,
            store,
            applier,
            catchup: None,
            filter: None,
            tracker: None,
        }
    }

    /// Adds a directory (or single file) to watch, non-recursively.
    ///
    /// Prefer directories: a log rotated by rename is replaced by a new
    /// inode, which a watch on the old file would not follow.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::PathNotFound`] if `path` does not exist.
    pub fn add_path(&mut self, path: impl AsRef<Utf8Path>) -> Result<(), TailError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TailError::path_not_found(path));
        }
        let path = path
            .canonicalize_utf8()
            .map_err(|e| TailError::io(path, e))?;
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
        Ok(())
    }

    /// Returns the watched paths.
    #[must_use]
    pub fn paths(&self) -> &[Utf8PathBuf] {
        &self.paths
    }

    /// Subscribes to file-system changes and starts the event loop and the
    /// activity sweeper.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::AlreadyStarted`] or [`TailError::Stopped`] on
    /// misuse, and [`TailError::Notify`] if the subscription fails.
    #[allow(clippy::unused_async)] // Async for API consistency with stop()
    pub async fn start(&mut self) -> Result<(), TailError> {
        if self.running.is_some() {
            return Err(TailError::AlreadyStarted);
        }
        if self.shared.cancel.is_cancelled() {
            return Err(TailError::Stopped);
        }

        let (tx, rx) = mpsc::channel::<ChangedPaths>(self.shared.watch.queue_capacity.max(1));
        let filter = Arc::clone(&self.filter);
        let mut debouncer = new_debouncer(
            self.shared.watch.debounce(),
            move |res: DebounceEventResult| match res {
                Ok(events) => {
                    let mut changed = ChangedPaths::new();
                    for event in events {
                        let path = match Utf8PathBuf::try_from(event.path) {
                            Ok(path) => path,
                            Err(e) => {
                                let err = TailError::NonUtf8Path(e.into_path_buf());
                                warn!(error = %err, "Skipping file event");
                                continue;
                            }
                        };
                        if !filter.should_process(&path) {
                            trace!(path = %path, "Filtered out file event");
                            continue;
                        }
                        changed.push(path);
                    }
                    if !changed.is_empty() && tx.blocking_send(changed).is_err() {
                        debug!("Event loop closed, dropping file events");
                    }
                }
                Err(error) => warn!(error = %error, "Debouncer error"),
            },
        )?;

        for path in &self.paths {
            debouncer
                .watcher()
                .watch(path.as_std_path(), RecursiveMode::NonRecursive)?;
            info!(path = %path, "Watching for log changes");
        }

        let event_loop = tokio::spawn(run_event_loop(Arc::clone(&self.shared), rx));
        let sweeper = tokio::spawn(
            Arc::clone(&self.shared.tracker).run_sweeper(self.shared.cancel.clone()),
        );

        self.running = Some(Running {
            debouncer,
            event_loop,
            sweeper,
        });
        info!(
            paths = self.paths.len(),
            catchup = self.shared.catchup.is_some(),
            "Watcher started"
        );
        Ok(())
    }

    /// Enqueues a change signal for `path` exactly as a file-system
    /// notification would, bypassing only the file filter.
    ///
    /// Useful for priming sources at startup and for hosts that learn about
    /// writes by other means. Requires a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::UnresolvableSource`] if no source identifier can
    /// be derived from `path`.
    pub fn dispatch(&self, path: impl Into<Utf8PathBuf>) -> Result<EnqueueOutcome, TailError> {
        self.shared.dispatch_path(path.into())
    }

    /// Queues an explicit reset of `source`: its offset returns to zero, its
    /// creation marker is cleared, and the next change is handled as first
    /// contact.
    ///
    /// The reset runs on the source's own worker, after any passes already
    /// queued for it.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::UnknownSource`] if the source has no registry
    /// entry, or [`TailError::Store`] if the registry cannot be read.
    pub async fn reset_source(&self, source: &SourceId) -> Result<EnqueueOutcome, TailError> {
        let state = self
            .shared
            .store
            .load(source)
            .await?
            .ok_or_else(|| TailError::UnknownSource(source.clone()))?;
        Ok(self
            .shared
            .enqueue(ChangeSignal::reset(source.clone(), state.path)))
    }

    /// Registers the callback invoked when a source becomes active.
    pub fn on_source_active(&self, callback: impl Fn(SourceId) + Send + Sync + 'static) {
        self.shared.tracker.on_source_active(callback);
    }

    /// Registers the callback invoked when a source becomes inactive.
    pub fn on_source_inactive(&self, callback: impl Fn(SourceId) + Send + Sync + 'static) {
        self.shared.tracker.on_source_inactive(callback);
    }

    /// Returns the activity tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<ServerStateTracker> {
        &self.shared.tracker
    }

    /// Returns `true` between a successful [`start`](Self::start) and
    /// [`stop`](Self::stop).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Stops the watcher.
    ///
    /// Cancels the shared token, closes every source queue, waits for the
    /// event loop, the sweeper and every worker to exit, and only then
    /// releases the file-system subscription. A stopped watcher cannot be
    /// restarted.
    pub async fn stop(&mut self) {
        self.shared.cancel.cancel();
        let mut tasks = self.shared.queues.close();
        let debouncer = self.running.take().map(|running| {
            tasks.push(running.event_loop);
            tasks.push(running.sweeper);
            running.debouncer
        });

        for task in tasks {
            match task.await {
                Err(err) if err.is_panic() => {
                    error!(error = %err, "Task panicked before shutdown");
                }
                _ => {}
            }
        }

        drop(debouncer);
        info!("Watcher stopped");
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

/// Builder for [`Watcher`].
pub struct WatcherBuilder {
    config: Config,
    store: Arc<dyn StateStore>,
    applier: Arc<dyn LineApplier>,
    catchup: Option<(Arc<dyn LivenessProbe>, Arc<dyn SessionRepository>)>,
    filter: Option<Arc<dyn FileFilter>>,
    tracker: Option<Arc<ServerStateTracker>>,
}

impl std::fmt::Debug for WatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherBuilder")
            .field("config", &self.config)
            .field("catchup", &self.catchup.is_some())
            .finish_non_exhaustive()
    }
}

impl WatcherBuilder {
    /// Enables startup catch-up with the given collaborators.
    ///
    /// Without them (or with `catchup.enabled = false`) first contact always
    /// baselines at the end of file.
    #[must_use]
    pub fn catchup(
        mut self,
        probe: Arc<dyn LivenessProbe>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        self.catchup = Some((probe, sessions));
        self
    }

    /// Replaces the default [`LogFileFilter`].
    #[must_use]
    pub fn filter(mut self, filter: impl FileFilter) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Shares an existing tracker instead of creating one.
    #[must_use]
    pub fn tracker(mut self, tracker: Arc<ServerStateTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Validates the configuration and builds the watcher. Nothing runs
    /// until [`Watcher::start`] or [`Watcher::dispatch`].
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Config`] if the configuration is invalid.
    pub fn build(self) -> Result<Watcher, TailError> {
        self.config.validate()?;
        let Config {
            watch,
            catchup,
            activity,
            ..
        } = self.config;

        let processor = match self.catchup {
            Some((probe, sessions)) if catchup.enabled => Some(CatchupProcessor::new(
                catchup,
                probe,
                sessions,
                Arc::clone(&self.applier),
            )),
            _ => {
                debug!("Startup catch-up disabled");
                None
            }
        };
        let filter: Arc<dyn FileFilter> = match self.filter {
            Some(filter) => filter,
            None => Arc::new(LogFileFilter::new(watch.extension.clone())),
        };
        let tracker = self
            .tracker
            .unwrap_or_else(|| Arc::new(ServerStateTracker::new(activity)));

        Ok(Watcher {
            shared: Arc::new(Shared {
                queues: SourceQueues::new(watch.queue_capacity),
                watch,
                store: self.store,
                applier: self.applier,
                catchup: processor,
                rotation: RotationDetector::new(),
                tracker,
                cancel: CancellationToken::new(),
            }),
            filter,
            paths: Vec::new(),
            running: None,
        })
    }
}

async fn run_event_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<ChangedPaths>) {
    loop {
        let batch = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            batch = rx.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        trace!(paths = batch.len(), "Change batch received");
        for path in batch {
            if let Err(err) = shared.dispatch_path(path) {
                warn!(error = %err, "Ignoring file change");
            }
        }
    }
    debug!("Event loop stopped");
}

/// Drains one source's queue, one pass at a time.
struct SourceWorker {
    shared: Arc<Shared>,
    source: SourceId,
    first_pass: bool,
    baseline_allowed: bool,
}

impl SourceWorker {
    fn new(shared: Arc<Shared>, source: SourceId) -> Self {
        Self {
            shared,
            source,
            first_pass: true,
            baseline_allowed: true,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<ChangeSignal>) {
        debug!(source = %self.source, "Source worker started");
        loop {
            let signal = tokio::select! {
                biased;
                () = self.shared.cancel.cancelled() => break,
                signal = rx.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
            };

            trace!(
                source = %self.source,
                kind = ?signal.kind,
                queued = ?signal.received_at.elapsed(),
                "Signal dequeued"
            );
            match signal.kind {
                SignalKind::Changed => self.handle_change(&signal.path).await,
                SignalKind::Reset => self.handle_reset().await,
            }
        }
        debug!(source = %self.source, "Source worker stopped");
    }

    async fn handle_change(&mut self, path: &Utf8Path) {
        match self.read_pass(path).await {
            Ok(report) => debug!(
                source = %self.source,
                lines = report.lines,
                failed = report.failed,
                offset = report.offset,
                skipped = report.skipped,
                "Read pass complete"
            ),
            Err(err) if err.is_configuration() => {
                error!(source = %self.source, path = %path, error = %err, "Read pass aborted");
            }
            Err(err) => {
                warn!(
                    source = %self.source,
                    path = %path,
                    error = %err,
                    "Read pass failed, will retry on next change"
                );
            }
        }
    }

    async fn handle_reset(&mut self) {
        match self.reset().await {
            Ok(()) => info!(source = %self.source, "Source reset, next change is first contact"),
            Err(err) => warn!(source = %self.source, error = %err, "Source reset failed"),
        }
    }

    async fn load_state(&self) -> Result<SourceWatchState, TailError> {
        self.shared
            .store
            .load(&self.source)
            .await?
            .ok_or_else(|| TailError::UnknownSource(self.source.clone()))
    }

    async fn read_pass(&mut self, path: &Utf8Path) -> Result<PassReport, TailError> {
        let shared = Arc::clone(&self.shared);
        let mut state = self.load_state().await?;
        let mut report = PassReport::default();

        if std::mem::take(&mut self.first_pass) && state.is_first_contact() {
            report.catchup = self.try_catchup(&mut state, path).await?;
        }

        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| TailError::io(path, e))?
            .len();
        let check = shared
            .rotation
            .check_rotation(path, &self.source, &state, size)
            .await;
        report.rotated = check.rotated;

        let decision = RotationDetector::skip_decision(&check, self.baseline_allowed);
        let skip = shared
            .rotation
            .should_skip_processing(
                shared.store.as_ref(),
                path,
                &mut state,
                &check,
                self.baseline_allowed,
            )
            .await?;
        self.baseline_allowed = false;
        if skip {
            report.skipped = true;
            report.offset = match decision {
                SkipDecision::Baseline => state.offset,
                SkipDecision::AtEnd | SkipDecision::Read => check.new_offset,
            };
            return Ok(report);
        }

        let ctx = ApplyContext::realtime(self.source.clone(), path);
        let read = apply_lines(
            path,
            check.new_offset,
            check.current_size,
            shared.applier.as_ref(),
            &ctx,
        )
        .await
        .map_err(|e| TailError::io(path, e))?;
        report.lines = read.lines;
        report.failed = read.failed;
        report.offset = check.new_offset;

        if read.lines == 0 {
            return Ok(report);
        }

        state.offset = read.end_offset;
        state.creation_marker = check.extracted_marker;
        shared.store.save(&state).await?;
        report.offset = read.end_offset;

        shared.tracker.update_activity(&self.source);
        shared.tracker.mark_active(&self.source);
        Ok(report)
    }

    /// Attempts catch-up and persists its result. `Ok(None)` means catch-up
    /// was unavailable or rejected and the pass continues normally.
    async fn try_catchup(
        &mut self,
        state: &mut SourceWatchState,
        path: &Utf8Path,
    ) -> Result<Option<CatchupOutcome>, TailError> {
        let Some(catchup) = self.shared.catchup.as_ref() else {
            return Ok(None);
        };
        let Some(outcome) = catchup.check_startup_catchup(state, path).await else {
            return Ok(None);
        };

        state.offset = outcome.end_offset;
        state.creation_marker = extract_creation_marker(path).await.unwrap_or_else(|err| {
            debug!(source = %self.source, error = %err, "Could not read creation marker");
            None
        });
        self.shared.store.save(state).await?;
        self.baseline_allowed = false;

        if outcome.lines_replayed > 0 {
            self.shared.tracker.update_activity(&self.source);
            self.shared.tracker.mark_active(&self.source);
        }
        Ok(Some(outcome))
    }

    async fn reset(&mut self) -> Result<(), TailError> {
        let mut state = self.load_state().await?;
        state.reset();
        self.shared.store.save(&state).await?;
        self.first_pass = true;
        self.baseline_allowed = true;
        Ok(())
    }
}
