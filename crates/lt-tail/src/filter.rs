//! File filtering for change notifications.
//!
//! A watched log directory usually also holds rotated backups, crash dumps and
//! config files. Filtering in the notify callback keeps those from ever
//! reaching the event loop, where they would resolve to unknown sources.
//!
//! # Examples
//!
//! ```
//! use lt_tail::{FileFilter, LogFileFilter};
//! use camino::Utf8Path;
//!
//! let filter = LogFileFilter::default();
//! assert!(filter.should_process(Utf8Path::new("logs/server-1.log")));
//! assert!(!filter.should_process(Utf8Path::new("logs/server-1-backup-2026.10.18.log")));
//! assert!(!filter.should_process(Utf8Path::new("logs/Game.ini")));
//! ```

use camino::Utf8Path;
use smallvec::SmallVec;

/// A filter for determining which changed paths are considered.
///
/// Filters run on the notify thread, so they must be [`Send`], [`Sync`] and
/// `'static`.
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if a change to `path` should reach the event loop.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// A filter that accepts all paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// Accepts live log files by extension, rejecting rotated backups.
#[derive(Debug, Clone)]
pub struct LogFileFilter {
    extension: String,
    exclude_patterns: SmallVec<[String; 4]>,
}

impl LogFileFilter {
    /// Creates a filter for files with `extension` (without the dot).
    ///
    /// Backups (`-backup-` in the file name) are excluded by default.
    #[must_use]
    pub fn new(extension: impl Into<String>) -> Self {
        let mut exclude_patterns = SmallVec::new();
        exclude_patterns.push("-backup-".to_owned());
        Self {
            extension: extension.into(),
            exclude_patterns,
        }
    }

    /// Adds a file-name substring that excludes a path.
    #[must_use]
    pub fn exclude_pattern(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if !self.exclude_patterns.contains(&pattern) {
            self.exclude_patterns.push(pattern);
        }
        self
    }
}

impl Default for LogFileFilter {
    fn default() -> Self {
        Self::new("log")
    }
}

impl FileFilter for LogFileFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        if path.extension() != Some(self.extension.as_str()) {
            return false;
        }
        let Some(name) = path.file_name() else {
            return false;
        };
        !self
            .exclude_patterns
            .iter()
            .any(|pattern| name.contains(pattern.as_str()))
    }
}

/// Combines filters with AND logic. An empty composite accepts everything.
///
/// # Examples
///
/// ```
/// use lt_tail::{CompositeFilter, FileFilter, LogFileFilter};
/// use camino::Utf8Path;
///
/// struct OnlyServers;
/// impl FileFilter for OnlyServers {
///     fn should_process(&self, path: &Utf8Path) -> bool {
///         path.file_name().is_some_and(|n| n.starts_with("server-"))
///     }
/// }
///
/// let filter = CompositeFilter::new().and(LogFileFilter::default()).and(OnlyServers);
/// assert!(filter.should_process(Utf8Path::new("logs/server-2.log")));
/// assert!(!filter.should_process(Utf8Path::new("logs/proxy.log")));
/// ```
#[derive(Default)]
pub struct CompositeFilter {
    filters: Vec<Box<dyn FileFilter>>,
}

impl CompositeFilter {
    /// Creates a new empty composite filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter to the composite.
    #[must_use]
    pub fn and<F: FileFilter>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl std::fmt::Debug for CompositeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeFilter")
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl FileFilter for CompositeFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        self.filters.iter().all(|f| f.should_process(path))
    }
}

impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for std::sync::Arc<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_extension() {
        let filter = LogFileFilter::default();
        assert!(filter.should_process(Utf8Path::new("server.log")));
        assert!(!filter.should_process(Utf8Path::new("server.log.1")));
        assert!(!filter.should_process(Utf8Path::new("server")));
    }

    #[test]
    fn test_log_filter_custom_extension() {
        let filter = LogFileFilter::new("txt");
        assert!(filter.should_process(Utf8Path::new("logs/server.txt")));
        assert!(!filter.should_process(Utf8Path::new("logs/server.log")));
    }

    #[test]
    fn test_log_filter_only_matches_file_name() {
        let filter = LogFileFilter::default();
        assert!(filter.should_process(Utf8Path::new("/srv/x-backup-dir/server.log")));
    }

    #[test]
    fn test_log_filter_extra_exclusion() {
        let filter = LogFileFilter::default().exclude_pattern("crash");
        assert!(!filter.should_process(Utf8Path::new("logs/crash-01.log")));
        assert!(filter.should_process(Utf8Path::new("logs/server.log")));
    }

    #[test]
    fn test_empty_composite_accepts_all() {
        let filter = CompositeFilter::new();
        assert!(filter.should_process(Utf8Path::new("anything")));
    }

    #[test]
    fn test_arc_filter() {
        let filter: std::sync::Arc<dyn FileFilter> = std::sync::Arc::new(AcceptAllFilter);
        assert!(filter.should_process(Utf8Path::new("a.log")));
    }
}
