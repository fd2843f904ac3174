//! Test doubles for the collaborator traits.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lt_core::{
    ApplyContext, ApplyError, ApplyMode, LineApplier, LivenessProbe, ProbeError, ServerStatus,
    SourceId, SourceWatchState, StateStore, StoreError,
};
use parking_lot::Mutex;

use crate::store::MemoryStateStore;

/// Records accepted lines; optionally rejects one exact line, sleeps per
/// line, and counts overlapping calls.
#[derive(Debug, Default)]
pub(crate) struct RecordingApplier {
    accepted: Mutex<Vec<(ApplyMode, String)>>,
    reject: Option<String>,
    delay: Option<Duration>,
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
}

impl RecordingApplier {
    pub(crate) fn rejecting(line: &str) -> Self {
        Self {
            reject: Some(line.to_owned()),
            ..Self::default()
        }
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.accepted.lock().iter().map(|(_, l)| l.clone()).collect()
    }

    pub(crate) fn catchup_lines(&self) -> usize {
        self.accepted
            .lock()
            .iter()
            .filter(|(mode, _)| *mode == ApplyMode::Catchup)
            .count()
    }

    /// Number of times `apply` was entered while another call was running.
    pub(crate) fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LineApplier for RecordingApplier {
    async fn apply(&self, ctx: &ApplyContext, line: &str) -> Result<(), ApplyError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.reject.as_deref() == Some(line) {
            Err(ApplyError::Malformed(line.to_owned()))
        } else {
            self.accepted.lock().push((ctx.mode, line.to_owned()));
            Ok(())
        };

        self.in_flight.store(false, Ordering::SeqCst);
        result
    }
}

/// Probe returning a fixed answer, or never answering.
#[derive(Debug)]
pub(crate) struct StaticProbe {
    answer: Option<Result<ServerStatus, String>>,
}

impl StaticProbe {
    pub(crate) fn new(answer: Result<ServerStatus, ProbeError>) -> Self {
        Self {
            answer: Some(answer.map_err(|e| e.to_string())),
        }
    }

    pub(crate) fn hanging() -> Self {
        Self { answer: None }
    }
}

#[async_trait]
impl LivenessProbe for StaticProbe {
    async fn query(&self, _address: &str) -> Result<ServerStatus, ProbeError> {
        match &self.answer {
            Some(Ok(status)) => Ok(status.clone()),
            Some(Err(reason)) => Err(ProbeError::Unreachable(reason.clone())),
            None => std::future::pending().await,
        }
    }
}

/// In-memory store whose writes can be switched to fail.
#[derive(Debug, Default)]
pub(crate) struct FailingStore {
    pub(crate) inner: MemoryStateStore,
    fail_saves: AtomicBool,
}

impl FailingStore {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.fail_saves.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for FailingStore {
    async fn load(&self, source: &SourceId) -> Result<Option<SourceWatchState>, StoreError> {
        self.inner.load(source).await
    }

    async fn save(&self, state: &SourceWatchState) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".to_owned()));
        }
        self.inner.save(state).await
    }

    async fn list(&self) -> Result<Vec<SourceWatchState>, StoreError> {
        self.inner.list().await
    }
}
