//! Startup catch-up: reattaching to an in-progress session after a restart.
//!
//! On first contact with a source there are two bad options: replay the whole
//! file (slow, and re-fires side effects for events long past) or jump to the
//! end (losing the open session's partial statistics). Catch-up replays only
//! the current session, and only when the log provably still describes what
//! the monitored process is running right now.
//!
//! # Gates
//!
//! Evaluated in order, short-circuiting on the first failure:
//!
//! 1. **Liveness** - the process answers a bounded status query and reports a map.
//! 2. **Freshness** - the file was modified recently. The window is short
//!    when the tail shows an external controller polling the process, long
//!    otherwise.
//! 3. **Recent session** - a session-start line exists, at or before now,
//!    and is not too old.
//! 4. **Consistency** - that line's map matches the live map (ignoring case).
//!
//! Any failure leaves persisted state untouched; the caller then falls back to
//! the ordinary new-source baseline.

use std::sync::Arc;
use std::time::SystemTime;

use camino::Utf8Path;
use chrono::{DateTime, TimeDelta, Utc};
use lt_core::{
    ApplyContext, CatchupConfig, CatchupDecision, LineApplier, LivenessProbe, NewSession,
    ProbeError, SessionId, SessionRepository, Side, SourceWatchState,
};
use tracing::{debug, info, warn};

use crate::error::TailError;
use crate::markers::{controller_recently_polled, find_last_session_marker, read_tail_lines};
use crate::reader::apply_lines;

/// Why catch-up was not performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchupRejection {
    /// The source has no query address configured.
    NoAddress,
    /// The liveness query failed or timed out.
    Offline(String),
    /// The process answered but reported no current map.
    NoLiveMap,
    /// The file has not been modified within the applicable window.
    Stale {
        /// Age of the file.
        age: TimeDelta,
        /// Whether the short (controller-polled) window applied.
        controller_polling: bool,
    },
    /// No session-start line at or before now.
    NoSessionMarker,
    /// The newest session-start line is too old.
    SessionTooOld {
        /// Age of the line.
        age: TimeDelta,
    },
    /// The logged map differs from the live one.
    MapMismatch {
        /// Map reported by the process.
        live: String,
        /// Map named by the log.
        logged: String,
    },
    /// The file could not be inspected.
    Io(String),
}

impl std::fmt::Display for CatchupRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAddress => f.write_str("no query address configured"),
            Self::Offline(reason) => write!(f, "process offline: {reason}"),
            Self::NoLiveMap => f.write_str("process reported no current map"),
            Self::Stale {
                age,
                controller_polling,
            } => write!(
                f,
                "log last modified {}s ago (controller polling: {controller_polling})",
                age.num_seconds()
            ),
            Self::NoSessionMarker => f.write_str("no session-start line found"),
            Self::SessionTooOld { age } => {
                write!(f, "last session started {}s ago", age.num_seconds())
            }
            Self::MapMismatch { live, logged } => {
                write!(f, "live map '{live}' does not match logged map '{logged}'")
            }
            Self::Io(reason) => write!(f, "cannot inspect log: {reason}"),
        }
    }
}

/// Result of a completed catch-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchupOutcome {
    /// Offset to persist as the new starting point.
    pub end_offset: u64,
    /// Lines replayed.
    pub lines_replayed: usize,
    /// The session the replay was attributed to.
    pub session_id: SessionId,
}

/// Decides whether to replay history on first contact, and replays it.
pub struct CatchupProcessor {
    config: CatchupConfig,
    probe: Arc<dyn LivenessProbe>,
    sessions: Arc<dyn SessionRepository>,
    applier: Arc<dyn LineApplier>,
}

impl std::fmt::Debug for CatchupProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatchupProcessor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CatchupProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(
        config: CatchupConfig,
        probe: Arc<dyn LivenessProbe>,
        sessions: Arc<dyn SessionRepository>,
        applier: Arc<dyn LineApplier>,
    ) -> Self {
        Self {
            config,
            probe,
            sessions,
            applier,
        }
    }

    /// Runs the gates and, if all pass, seeds the session and replays it.
    ///
    /// Returns `None` when catch-up was rejected or failed; nothing is
    /// persisted by this method in either case.
    pub async fn check_startup_catchup(
        &self,
        state: &SourceWatchState,
        path: &Utf8Path,
    ) -> Option<CatchupOutcome> {
        let source = &state.source_id;
        let decision = match self.evaluate(state, path, Utc::now()).await {
            Ok(decision) => decision,
            Err(rejection) => {
                info!(source = %source, reason = %rejection, "Skipping startup catch-up");
                return None;
            }
        };

        match self.replay(state, path, &decision).await {
            Ok(outcome) => {
                info!(
                    source = %source,
                    map = %decision.map,
                    scenario = %decision.scenario,
                    side = %decision.side,
                    session = %outcome.session_id,
                    lines = outcome.lines_replayed,
                    end_offset = outcome.end_offset,
                    "Startup catch-up complete"
                );
                Some(outcome)
            }
            Err(err) => {
                warn!(source = %source, error = %err, "Startup catch-up failed");
                None
            }
        }
    }

    /// Evaluates the four gates against the file as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the first gate that failed.
    pub async fn evaluate(
        &self,
        state: &SourceWatchState,
        path: &Utf8Path,
        now: DateTime<Utc>,
    ) -> Result<CatchupDecision, CatchupRejection> {
        // 1. Liveness
        let live_map = self.query_live_map(state).await?;

        // 2. Freshness, adaptive
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| CatchupRejection::Io(e.to_string()))?;
        let modified = metadata
            .modified()
            .map_err(|e| CatchupRejection::Io(e.to_string()))?;
        let tail = read_tail_lines(path, self.config.controller_scan_lines)
            .await
            .map_err(|e| CatchupRejection::Io(e.to_string()))?;
        let controller_polling =
            controller_recently_polled(&tail, now, self.config.controller_window());
        let age = age_of(modified, now);
        let window = TimeDelta::from_std(self.config.freshness_window(controller_polling))
            .unwrap_or(TimeDelta::MAX);
        if age > window {
            return Err(CatchupRejection::Stale {
                age,
                controller_polling,
            });
        }

        // 3. Recent session marker
        let marker = find_last_session_marker(path, now)
            .await
            .map_err(|e| CatchupRejection::Io(e.to_string()))?
            .ok_or(CatchupRejection::NoSessionMarker)?;
        let session_age = now.signed_duration_since(marker.timestamp);
        let max_age =
            TimeDelta::from_std(self.config.session_max_age()).unwrap_or(TimeDelta::MAX);
        if session_age > max_age {
            return Err(CatchupRejection::SessionTooOld { age: session_age });
        }

        // 4. Consistency
        if !marker.map.eq_ignore_ascii_case(&live_map) {
            return Err(CatchupRejection::MapMismatch {
                live: live_map,
                logged: marker.map,
            });
        }

        debug!(
            source = %state.source_id,
            controller_polling,
            lines_from_end = marker.lines_from_end,
            "Catch-up gates passed"
        );

        Ok(CatchupDecision {
            side: Side::from_scenario(&marker.scenario),
            map: marker.map,
            scenario: marker.scenario,
            started_at: marker.timestamp,
            replay_from: marker.byte_offset,
            lines_from_end: marker.lines_from_end,
            end_offset: metadata.len(),
        })
    }

    /// Seeds (or reuses) the open session and replays `[replay_from, end_offset)`
    /// in catch-up mode.
    ///
    /// The returned `end_offset` is the end of the last complete replayed
    /// line, which equals the decision's `end_offset` unless the file ended
    /// mid-line.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Session`] if the session cannot be found or
    /// created, or [`TailError::Io`] if the file cannot be read.
    pub async fn replay(
        &self,
        state: &SourceWatchState,
        path: &Utf8Path,
        decision: &CatchupDecision,
    ) -> Result<CatchupOutcome, TailError> {
        let source = &state.source_id;
        let session = match self.sessions.open_session(source).await? {
            Some(existing) => {
                debug!(source = %source, session = %existing.id, "Reusing open session");
                existing
            }
            None => {
                self.sessions
                    .create_session(NewSession::from_decision(source.clone(), decision))
                    .await?
            }
        };

        let ctx = ApplyContext::catchup(source.clone(), path);
        let read = apply_lines(
            path,
            decision.replay_from,
            decision.end_offset,
            self.applier.as_ref(),
            &ctx,
        )
        .await
        .map_err(|e| TailError::io(path, e))?;

        Ok(CatchupOutcome {
            end_offset: read.end_offset,
            lines_replayed: read.lines,
            session_id: session.id,
        })
    }

    async fn query_live_map(&self, state: &SourceWatchState) -> Result<String, CatchupRejection> {
        let address = state
            .query_address
            .as_deref()
            .ok_or(CatchupRejection::NoAddress)?;
        let timeout = self.config.liveness_timeout();

        let status = match tokio::time::timeout(timeout, self.probe.query(address)).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => return Err(CatchupRejection::Offline(err.to_string())),
            Err(_elapsed) => {
                return Err(CatchupRejection::Offline(
                    ProbeError::Timeout(timeout).to_string(),
                ));
            }
        };

        status
            .current_map()
            .map(str::to_owned)
            .ok_or(CatchupRejection::NoLiveMap)
    }
}

/// Age of a file modification time relative to `now`; never negative.
fn age_of(modified: SystemTime, now: DateTime<Utc>) -> TimeDelta {
    let modified: DateTime<Utc> = modified.into();
    now.signed_duration_since(modified).max(TimeDelta::zero())
}
