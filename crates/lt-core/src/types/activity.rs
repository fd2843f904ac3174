//! Per-source activity bookkeeping.

use std::time::{Duration, Instant};

/// Last-activity time and active flag for one source.
///
/// Created the first time any bytes are processed for a source and kept for
/// the lifetime of the tracker. `is_active` only flips to `true` after a read
/// pass that processed at least one line, and only flips back to `false` from
/// the inactivity sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySnapshot {
    /// When the source last produced a processed line.
    pub last_activity: Instant,
    /// Whether the source is currently considered active.
    pub is_active: bool,
}

impl ActivitySnapshot {
    /// Creates an inactive snapshot stamped at `now`.
    #[inline]
    #[must_use]
    pub const fn new(now: Instant) -> Self {
        Self {
            last_activity: now,
            is_active: false,
        }
    }

    /// Returns `true` if the source has been silent for longer than `threshold`.
    #[inline]
    #[must_use]
    pub fn is_idle(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > threshold
    }
}
