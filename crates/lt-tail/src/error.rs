//! Error types for the lt-tail crate.
//!
//! This module provides the [`TailError`] type for everything that can go wrong
//! while subscribing to file-system changes or running a read pass.

use camino::Utf8PathBuf;
use lt_core::{ConfigError, SessionError, SourceId, StoreError};

/// Errors that can occur while watching and ingesting logs.
///
/// # Error Recovery Strategy
///
/// Nothing here is fatal to the host process. Errors fall into three groups:
///
/// - **Startup** ([`TailError::Config`], [`TailError::Notify`], [`TailError::PathNotFound`],
///   [`TailError::AlreadyStarted`], [`TailError::Stopped`]): the watcher
///   cannot start; surface to the host.
/// - **Configuration** ([`TailError::Config`], [`TailError::UnknownSource`],
///   [`TailError::UnresolvableSource`], [`TailError::NonUtf8Path`]): the
///   watcher is not built, or the change is dropped and not retried; the
///   registry is authoritative and is not repaired here.
/// - **Transient** ([`TailError::Io`], [`TailError::Store`],
///   [`TailError::Session`]): the pass is aborted and naturally retried on
///   the next change notification.
///
/// # Examples
///
/// ```
/// use lt_tail::TailError;
/// use lt_core::SourceId;
///
/// let err = TailError::UnknownSource(SourceId::new("server-9"));
/// assert!(!err.is_retryable());
/// assert!(!err.is_fatal());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    /// The configuration handed to the builder is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The path to watch does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// `start()` was called on a running watcher.
    #[error("watcher is already running")]
    AlreadyStarted,

    /// `start()` was called after `stop()`.
    #[error("watcher has been stopped")]
    Stopped,

    /// A change resolved to a source with no registry entry.
    #[error("no registry entry for source '{0}'")]
    UnknownSource(SourceId),

    /// No source identifier can be derived from the path.
    #[error("cannot derive a source identifier from {0}")]
    UnresolvableSource(Utf8PathBuf),

    /// A file event named a path that is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// Opening, seeking, or reading a log file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file being accessed.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Loading or persisting source state failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session repository failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl TailError {
    /// Creates a new [`TailError::Io`] error.
    #[inline]
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`TailError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Returns `true` if the next change notification may succeed where this
    /// attempt failed.
    #[inline]
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Store(_) | Self::Session(_)
        )
    }

    /// Returns `true` if the error stems from configuration rather than
    /// from the environment.
    #[inline]
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::UnknownSource(_)
                | Self::UnresolvableSource(_)
                | Self::NonUtf8Path(_)
        )
    }

    /// Returns `true` if the watcher cannot start or keep running.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Notify(_)
                | Self::PathNotFound(_)
                | Self::AlreadyStarted
                | Self::Stopped
        )
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::PathNotFound(path) | Self::UnresolvableSource(path) | Self::Io { path, .. } => {
                Some(path)
            }
            Self::Config(_)
            | Self::Notify(_)
            | Self::AlreadyStarted
            | Self::Stopped
            | Self::UnknownSource(_)
            | Self::NonUtf8Path(_)
            | Self::Store(_)
            | Self::Session(_) => None,
        }
    }
}
