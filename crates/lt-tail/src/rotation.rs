//! Rotation and truncation detection.
//!
//! A log is considered a new generation when either of two independent
//! signals fires:
//!
//! 1. **Creation marker changed**: the timestamp on the first line differs
//!    from the persisted one. Catches swaps to an already larger file.
//! 2. **Size shrank**: the file is smaller than the persisted offset.
//!    Catches truncation, and rotations where the monitored process wrote an
//!    unreadable or colliding creation line.
//!
//! Either way reading restarts at byte 0.

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use lt_core::{SourceId, SourceWatchState, StateStore};
use tracing::{debug, info};

use crate::error::TailError;
use crate::markers::extract_creation_marker;
use crate::reader::complete_lines_end;

/// Which signal declared a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// The first-line timestamp changed.
    CreationMarkerChanged,
    /// The file is smaller than the persisted offset.
    Truncated,
}

/// Result of [`RotationDetector::check_rotation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationCheck {
    /// Whether the file is a new generation.
    pub rotated: bool,
    /// Why, when `rotated` is set.
    pub reason: Option<RotationReason>,
    /// Offset to resume reading from.
    pub new_offset: u64,
    /// File size observed for this pass.
    pub current_size: u64,
    /// Creation marker read from the file, if one could be extracted.
    pub extracted_marker: Option<DateTime<Utc>>,
}

/// What a read pass should do after rotation has been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipDecision {
    /// Brand-new source: record the end of the last complete line as the
    /// starting point and ingest nothing that was already there.
    Baseline,
    /// Nothing new since the last pass.
    AtEnd,
    /// New bytes to read.
    Read,
}

/// Decides whether a file is a continuation or a new generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RotationDetector;

impl RotationDetector {
    /// Creates a detector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Extracts the creation marker from `path` and compares it, together
    /// with `current_size`, against the persisted state.
    ///
    /// A marker that cannot be extracted is treated as absent; only the size
    /// signal applies then.
    pub async fn check_rotation(
        &self,
        path: &Utf8Path,
        source: &SourceId,
        state: &SourceWatchState,
        current_size: u64,
    ) -> RotationCheck {
        let extracted = match extract_creation_marker(path).await {
            Ok(marker) => marker,
            Err(err) => {
                debug!(source = %source, path = %path, error = %err, "Could not read creation marker");
                None
            }
        };

        let check = Self::evaluate(state, current_size, extracted);
        if let Some(reason) = check.reason {
            info!(
                source = %source,
                path = %path,
                ?reason,
                persisted_offset = state.offset,
                size = current_size,
                "Log rotation detected, reading from start"
            );
        }
        check
    }

    /// Pure rotation decision.
    ///
    /// # Examples
    ///
    /// ```
    /// use lt_core::{SourceId, SourceWatchState};
    /// use lt_tail::RotationDetector;
    ///
    /// let mut state = SourceWatchState::new(SourceId::new("alpha"), "alpha.log");
    /// state.offset = 50_000;
    ///
    /// let check = RotationDetector::evaluate(&state, 5_000, None);
    /// assert!(check.rotated);
    /// assert_eq!(check.new_offset, 0);
    /// ```
    #[must_use]
    pub fn evaluate(
        state: &SourceWatchState,
        current_size: u64,
        extracted: Option<DateTime<Utc>>,
    ) -> RotationCheck {
        let reason = match (state.creation_marker, extracted) {
            (Some(persisted), Some(fresh)) if persisted != fresh => {
                Some(RotationReason::CreationMarkerChanged)
            }
            _ if current_size < state.offset => Some(RotationReason::Truncated),
            _ => None,
        };

        RotationCheck {
            rotated: reason.is_some(),
            reason,
            new_offset: if reason.is_some() { 0 } else { state.offset },
            current_size,
            extracted_marker: extracted,
        }
    }

    /// Pure skip decision.
    ///
    /// `baseline_allowed` is `false` once the caller has already set a
    /// baseline (or read) for this source, so a file that was empty at first
    /// contact is read from the start rather than baselined again.
    #[must_use]
    pub const fn skip_decision(check: &RotationCheck, baseline_allowed: bool) -> SkipDecision {
        if check.new_offset == 0 && !check.rotated && baseline_allowed {
            SkipDecision::Baseline
        } else if check.new_offset == check.current_size {
            SkipDecision::AtEnd
        } else {
            SkipDecision::Read
        }
    }

    /// Decides whether the pass can stop here, persisting the baseline for a
    /// brand-new source.
    ///
    /// The baseline is the end of the last complete line of `path` within
    /// `check.current_size`, so a line still being written is read once it
    /// is finished.
    ///
    /// Returns `Ok(true)` when there is nothing to read.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be scanned, or the store
    /// error if the baseline cannot be persisted; the caller must then not
    /// treat the baseline as set.
    pub async fn should_skip_processing(
        &self,
        store: &dyn StateStore,
        path: &Utf8Path,
        state: &mut SourceWatchState,
        check: &RotationCheck,
        baseline_allowed: bool,
    ) -> Result<bool, TailError> {
        match Self::skip_decision(check, baseline_allowed) {
            SkipDecision::Baseline => {
                state.offset = complete_lines_end(path, check.current_size)
                    .await
                    .map_err(|e| TailError::io(path, e))?;
                state.creation_marker = check.extracted_marker;
                store.save(state).await?;
                info!(
                    source = %state.source_id,
                    offset = state.offset,
                    size = check.current_size,
                    "New source, tailing from current end of file"
                );
                Ok(true)
            }
            SkipDecision::AtEnd => {
                debug!(source = %state.source_id, offset = check.new_offset, "No new bytes");
                Ok(true)
            }
            SkipDecision::Read => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;
    use camino::Utf8PathBuf;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 14, minute, 0).unwrap()
    }

    fn state(offset: u64, marker: Option<DateTime<Utc>>) -> SourceWatchState {
        let mut state = SourceWatchState::new(SourceId::new("alpha"), "alpha.log");
        state.offset = offset;
        state.creation_marker = marker;
        state
    }

    #[test]
    fn test_rotation_by_creation_marker() {
        let check = RotationDetector::evaluate(&state(50_000, Some(t(1))), 5_000, Some(t(2)));
        assert!(check.rotated);
        assert_eq!(check.reason, Some(RotationReason::CreationMarkerChanged));
        assert_eq!(check.new_offset, 0);
    }

    #[test]
    fn test_rotation_by_marker_when_file_grew() {
        let check = RotationDetector::evaluate(&state(200, Some(t(1))), 90_000, Some(t(2)));
        assert!(check.rotated);
        assert_eq!(check.new_offset, 0);
    }

    #[test]
    fn test_rotation_by_size_without_marker() {
        let check = RotationDetector::evaluate(&state(50_000, Some(t(1))), 5_000, None);
        assert!(check.rotated);
        assert_eq!(check.reason, Some(RotationReason::Truncated));
        assert_eq!(check.new_offset, 0);
    }

    #[test]
    fn test_rotation_by_size_with_same_marker() {
        let check = RotationDetector::evaluate(&state(50_000, Some(t(1))), 5_000, Some(t(1)));
        assert!(check.rotated);
        assert_eq!(check.reason, Some(RotationReason::Truncated));
    }

    #[test]
    fn test_no_spurious_rotation() {
        let check = RotationDetector::evaluate(&state(200, Some(t(1))), 500, Some(t(1)));
        assert!(!check.rotated);
        assert_eq!(check.new_offset, 200);
        assert_eq!(check.current_size, 500);
    }

    #[test]
    fn test_new_marker_without_persisted_one_is_not_rotation() {
        let check = RotationDetector::evaluate(&state(200, None), 500, Some(t(1)));
        assert!(!check.rotated);
        assert_eq!(check.new_offset, 200);
    }

    #[test]
    fn test_skip_decisions() {
        let fresh = RotationDetector::evaluate(&state(0, None), 12_000, None);
        assert_eq!(RotationDetector::skip_decision(&fresh, true), SkipDecision::Baseline);
        assert_eq!(RotationDetector::skip_decision(&fresh, false), SkipDecision::Read);

        let at_end = RotationDetector::evaluate(&state(300, None), 300, None);
        assert_eq!(RotationDetector::skip_decision(&at_end, true), SkipDecision::AtEnd);

        let rotated = RotationDetector::evaluate(&state(50_000, Some(t(1))), 5_000, Some(t(2)));
        assert_eq!(RotationDetector::skip_decision(&rotated, true), SkipDecision::Read);
    }

    fn log_file(contents: &str) -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("alpha.log")).unwrap();
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_new_source_baseline_is_persisted() {
        let (_dir, path) = log_file(&"history line\n".repeat(1_000));
        let store = MemoryStateStore::new();
        let mut st = state(0, None);
        store.insert(st.clone());

        let check = RotationDetector::evaluate(&st, 13_000, Some(t(5)));
        let skip = RotationDetector::new()
            .should_skip_processing(&store, &path, &mut st, &check, true)
            .await
            .unwrap();

        assert!(skip);
        let persisted = store.get(&SourceId::new("alpha")).unwrap();
        assert_eq!(persisted.offset, 13_000);
        assert_eq!(persisted.creation_marker, Some(t(5)));
    }

    #[tokio::test]
    async fn test_baseline_stops_before_unfinished_line() {
        let (_dir, path) = log_file("old\nhalf a li");
        let store = MemoryStateStore::new();
        let mut st = state(0, None);

        let check = RotationDetector::evaluate(&st, 13, None);
        let skip = RotationDetector::new()
            .should_skip_processing(&store, &path, &mut st, &check, true)
            .await
            .unwrap();

        assert!(skip);
        assert_eq!(store.get(&SourceId::new("alpha")).unwrap().offset, 4);
    }

    #[tokio::test]
    async fn test_at_end_skips_without_writing() {
        let (_dir, path) = log_file(&"x".repeat(400));
        let store = MemoryStateStore::new();
        let mut st = state(400, Some(t(1)));

        let check = RotationDetector::evaluate(&st, 400, Some(t(1)));
        let skip = RotationDetector::new()
            .should_skip_processing(&store, &path, &mut st, &check, true)
            .await
            .unwrap();

        assert!(skip);
        assert!(store.get(&SourceId::new("alpha")).is_none());
    }
}
