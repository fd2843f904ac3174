//! Collaborator traits the ingestion core is wired against.
//!
//! The core never interprets event payloads, talks to the monitored process
//! directly, or owns durable storage. Hosts plug those concerns in through the
//! traits below; all of them are object-safe so they can be shared as
//! `Arc<dyn Trait>` across per-source workers.
//!
//! # Catch-up mode
//!
//! Every line handed to a [`LineApplier`] comes with an [`ApplyContext`]. When
//! [`ApplyContext::is_catchup`] is `true` the line is historical: the applier
//! must still record the event, but must suppress externally observable or
//! redundant side effects such as outbound chat responses or live score
//! broadcasts.

use async_trait::async_trait;
use camino::Utf8PathBuf;

use crate::error::{ApplyError, ProbeError, SessionError, StoreError};
use crate::types::{NewSession, ServerStatus, Session, SourceId, SourceWatchState};

/// How a line reached the applier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ApplyMode {
    /// Tailed as it was written.
    #[default]
    Realtime,
    /// Replayed from history during startup catch-up.
    Catchup,
}

/// Per-line context passed to the [`LineApplier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyContext {
    /// The source the line came from.
    pub source_id: SourceId,
    /// The file the line was read from.
    pub path: Utf8PathBuf,
    /// Whether the line is live or replayed.
    pub mode: ApplyMode,
}

impl ApplyContext {
    /// Context for lines tailed in real time.
    #[must_use]
    pub fn realtime(source_id: SourceId, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            source_id,
            path: path.into(),
            mode: ApplyMode::Realtime,
        }
    }

    /// Context for lines replayed during catch-up.
    #[must_use]
    pub fn catchup(source_id: SourceId, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            source_id,
            path: path.into(),
            mode: ApplyMode::Catchup,
        }
    }

    /// Returns `true` if side effects must be suppressed for this line.
    #[inline]
    #[must_use]
    pub fn is_catchup(&self) -> bool {
        self.mode == ApplyMode::Catchup
    }
}

/// Durable keyed storage for [`SourceWatchState`].
///
/// Each source's state is only ever written by that source's worker, so
/// implementations need no cross-source coordination beyond being `Sync`.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Loads the state for `source`, or `None` if no registry entry exists.
    async fn load(&self, source: &SourceId) -> Result<Option<SourceWatchState>, StoreError>;

    /// Persists `state`, replacing any previous entry for the same source.
    async fn save(&self, state: &SourceWatchState) -> Result<(), StoreError>;

    /// Returns every registered entry.
    async fn list(&self) -> Result<Vec<SourceWatchState>, StoreError>;
}

/// Turns one log line into zero or one domain events and applies them.
#[async_trait]
pub trait LineApplier: Send + Sync + 'static {
    /// Parses and applies `line` (without its line terminator).
    async fn apply(&self, ctx: &ApplyContext, line: &str) -> Result<(), ApplyError>;
}

/// Queries the live status of the monitored process.
///
/// Callers bound the query with their own timeout.
#[async_trait]
pub trait LivenessProbe: Send + Sync + 'static {
    /// Queries the process listening at `address`.
    async fn query(&self, address: &str) -> Result<ServerStatus, ProbeError>;
}

/// Repository of session records (e.g. matches).
#[async_trait]
pub trait SessionRepository: Send + Sync + 'static {
    /// Returns the currently open session for `source`, if any.
    async fn open_session(&self, source: &SourceId) -> Result<Option<Session>, SessionError>;

    /// Creates and opens a new session.
    async fn create_session(&self, session: NewSession) -> Result<Session, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_context_modes() {
        let live = ApplyContext::realtime(SourceId::new("alpha"), "alpha.log");
        assert!(!live.is_catchup());
        assert_eq!(live.mode, ApplyMode::default());

        let replay = ApplyContext::catchup(SourceId::new("alpha"), "alpha.log");
        assert!(replay.is_catchup());
    }
}
