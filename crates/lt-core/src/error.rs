//! Error types for the lt-core crate.
//!
//! [`ConfigError`] covers configuration loading and validation. The remaining
//! types describe failures at each collaborator boundary of the ingestion core:
//!
//! - [`StoreError`] - persisted per-source state could not be read or written
//! - [`ApplyError`] - a single log line was rejected by the line applier
//! - [`ProbeError`] - the liveness query against the monitored process failed
//! - [`SessionError`] - the session repository failed

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use lt_core::ConfigError;
///
/// let error = ConfigError::InvalidOption {
///     option: "watch.queue_capacity".to_owned(),
///     reason: "must be greater than zero".to_owned(),
/// };
/// assert!(error.to_string().contains("queue_capacity"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    NotFound(Utf8PathBuf),

    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by a [`StateStore`](crate::StateStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("state store I/O error at {path}: {source}")]
    Io {
        /// The backing file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file could not be (de)serialized.
    #[error("state store is corrupt: {0}")]
    Serde(#[from] serde_json::Error),

    /// The backend rejected the operation.
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

/// A single line could not be parsed or applied.
///
/// Line errors are logged and skipped by the caller; they never abort the
/// remaining lines of a read pass.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// The line matched a known event but its payload was malformed.
    #[error("malformed line: {0}")]
    Malformed(String),

    /// The event was well-formed but applying it to stored state failed.
    #[error("failed to apply event: {0}")]
    Apply(String),
}

/// The liveness query against the monitored process failed.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The query did not complete within the configured timeout.
    #[error("liveness query timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// No address is configured for the source.
    #[error("no query address configured")]
    NoAddress,

    /// The process could not be reached or answered with garbage.
    #[error("liveness query failed: {0}")]
    Unreachable(String),
}

/// The session repository failed.
#[derive(Debug, thiserror::Error)]
#[error("session repository error: {0}")]
pub struct SessionError(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_invalid_option_display() {
        let error = ConfigError::invalid_option("activity.sweep_interval_ms", "must be positive");
        let msg = error.to_string();
        assert!(msg.contains("activity.sweep_interval_ms"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_not_found_display() {
        let error = ConfigError::NotFound(Utf8PathBuf::from("/etc/logtail.json"));
        insta::assert_snapshot!(error.to_string(), @"configuration file not found: /etc/logtail.json");
    }

    #[test]
    fn test_store_io_display_names_path() {
        let error = StoreError::Io {
            path: Utf8PathBuf::from("state.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(error.to_string().contains("state.json"));
    }

    #[test]
    fn test_liveness_timeout_display() {
        let error = ProbeError::Timeout(Duration::from_secs(3));
        insta::assert_snapshot!(error.to_string(), @"liveness query timed out after 3s");
    }
}
