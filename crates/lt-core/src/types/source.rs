//! Source identity and persisted per-source watch state.

use std::borrow::Borrow;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of one monitored log.
///
/// Derived deterministically from the file path: the base name without its
/// extension, so `/srv/logs/server-1.log` is source `server-1`.
///
/// # Examples
///
/// ```
/// use lt_core::SourceId;
/// use camino::Utf8Path;
///
/// let id = SourceId::from_path(Utf8Path::new("/srv/logs/server-1.log")).unwrap();
/// assert_eq!(id.as_str(), "server-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Creates a source identifier from any string.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Resolves the source identifier for a log file path.
    ///
    /// Returns `None` for paths without a usable file stem.
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        path.file_stem()
            .filter(|stem| !stem.is_empty())
            .map(|stem| Self(stem.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Persisted cursor for one source.
///
/// One entry exists per configured source; the registry that owns these
/// entries is authoritative and the ingestion core never creates them.
///
/// At rest `offset` never exceeds the file size observed when it was written.
/// If it does on a later read, the file was truncated or replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceWatchState {
    /// The source this state belongs to.
    pub source_id: SourceId,

    /// Path of the monitored log file.
    pub path: Utf8PathBuf,

    /// Bytes already consumed from the file.
    #[serde(default)]
    pub offset: u64,

    /// Timestamp from the file's first line, identifying its generation.
    #[serde(default)]
    pub creation_marker: Option<DateTime<Utc>>,

    /// Address used to query the monitored process's live status.
    #[serde(default)]
    pub query_address: Option<String>,
}

impl SourceWatchState {
    /// Creates a fresh registry entry that has never been read.
    #[must_use]
    pub fn new(source_id: SourceId, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            source_id,
            path: path.into(),
            offset: 0,
            creation_marker: None,
            query_address: None,
        }
    }

    /// Sets the liveness query address.
    #[must_use]
    pub fn with_query_address(mut self, address: impl Into<String>) -> Self {
        self.query_address = Some(address.into());
        self
    }

    /// Returns `true` if this source has never been read since its entry was
    /// created: no bytes consumed and no generation recorded.
    #[inline]
    #[must_use]
    pub const fn is_first_contact(&self) -> bool {
        self.offset == 0 && self.creation_marker.is_none()
    }

    /// Forgets the cursor so the next pass treats the source as new.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.creation_marker = None;
    }
}
