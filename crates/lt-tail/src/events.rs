//! Change signals flowing from the file-system subscription to source workers.
//!
//! # Event Flow
//!
//! ```text
//! File System Change
//!        │
//!        ▼
//! notify-debouncer-mini (debounce window)
//!        │  filter + dedupe per batch
//!        ▼
//!   event loop resolves SourceId
//!        │
//!        ▼
//!   ChangeSignal ──► per-source bounded queue ──► source worker
//! ```

use std::time::Instant;

use camino::Utf8PathBuf;
use lt_core::SourceId;
use smallvec::SmallVec;

/// What the worker should do when it dequeues a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// The file changed; run a read pass.
    Changed,
    /// Forget the persisted cursor and treat the source as first contact.
    Reset,
}

/// A "re-check this file" signal for one source.
///
/// Signals carry no byte ranges: a worker always derives what is new from
/// the persisted offset, so a dropped signal only delays detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSignal {
    /// The source the path resolved to.
    pub source_id: SourceId,
    /// The changed file.
    pub path: Utf8PathBuf,
    /// What to do.
    pub kind: SignalKind,
    /// When the signal was produced.
    pub received_at: Instant,
}

impl ChangeSignal {
    /// Creates a change signal stamped now.
    #[inline]
    #[must_use]
    pub fn changed(source_id: SourceId, path: Utf8PathBuf) -> Self {
        Self {
            source_id,
            path,
            kind: SignalKind::Changed,
            received_at: Instant::now(),
        }
    }

    /// Creates a reset signal stamped now.
    #[inline]
    #[must_use]
    pub fn reset(source_id: SourceId, path: Utf8PathBuf) -> Self {
        Self {
            source_id,
            path,
            kind: SignalKind::Reset,
            received_at: Instant::now(),
        }
    }
}

/// Paths changed within one debounce window, deduplicated in arrival order.
///
/// Uses inline storage for the common case of a handful of logs per window.
#[derive(Debug, Clone, Default)]
pub struct ChangedPaths {
    paths: SmallVec<[Utf8PathBuf; 8]>,
}

impl ChangedPaths {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a path unless it is already present.
    pub fn push(&mut self, path: Utf8PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Returns the number of distinct paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns `true` if no path changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl IntoIterator for ChangedPaths {
    type Item = Utf8PathBuf;
    type IntoIter = smallvec::IntoIter<[Utf8PathBuf; 8]>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_paths_dedupes_in_order() {
        let mut paths = ChangedPaths::new();
        paths.push(Utf8PathBuf::from("logs/b.log"));
        paths.push(Utf8PathBuf::from("logs/a.log"));
        paths.push(Utf8PathBuf::from("logs/b.log"));

        assert_eq!(paths.len(), 2);
        let collected: Vec<_> = paths.into_iter().collect();
        assert_eq!(collected, vec!["logs/b.log", "logs/a.log"]);
    }

    #[test]
    fn test_signal_constructors() {
        let changed = ChangeSignal::changed(SourceId::new("a"), Utf8PathBuf::from("a.log"));
        assert_eq!(changed.kind, SignalKind::Changed);

        let reset = ChangeSignal::reset(SourceId::new("a"), Utf8PathBuf::from("a.log"));
        assert_eq!(reset.kind, SignalKind::Reset);
        assert_eq!(reset.source_id, changed.source_id);
    }
}
