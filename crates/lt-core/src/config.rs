//! Configuration structures for logtail.
//!
//! - [`WatchConfig`] - file-system subscription and per-source queue settings
//! - [`CatchupConfig`] - startup catch-up gates and their thresholds
//! - [`ActivityConfig`] - inactivity sweep cadence and threshold
//! - [`Config`] - root configuration combining all settings
//!
//! Every threshold is tunable. The defaults match a monitored server that
//! restarts roughly every eight hours and is optionally polled by an external
//! controller every few seconds.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for the file-system subscription and work queues.
///
/// # Examples
///
/// ```
/// use lt_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.debounce_ms, 100);
/// assert_eq!(config.queue_capacity, 100);
/// assert_eq!(config.extension, "log");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce window in milliseconds.
    ///
    /// Bursts of writes within this window collapse into one change signal.
    pub debounce_ms: u64,

    /// Capacity of each per-source work queue.
    ///
    /// Signals beyond this are dropped with a warning; the next write
    /// re-triggers detection.
    pub queue_capacity: usize,

    /// File extension (without the dot) of monitored log files.
    pub extension: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            queue_capacity: 100,
            extension: "log".to_owned(),
        }
    }
}

impl WatchConfig {
    /// Returns the debounce window as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Configuration for startup catch-up.
///
/// The freshness window is adaptive: when the tail of the log shows an
/// external controller polling the process, the file is expected to be
/// touched continuously and the short window applies. Otherwise an idle but
/// running process may leave the file untouched for hours.
///
/// # Examples
///
/// ```
/// use lt_core::CatchupConfig;
///
/// let config = CatchupConfig::default();
/// assert!(config.enabled);
/// assert_eq!(config.polled_freshness_secs, 60);
/// assert_eq!(config.idle_freshness_secs, 9 * 60 * 60);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CatchupConfig {
    /// Whether startup catch-up is attempted at all.
    pub enabled: bool,

    /// Upper bound on the liveness query, in milliseconds.
    pub liveness_timeout_ms: u64,

    /// Number of trailing lines searched for a controller-poll marker.
    pub controller_scan_lines: usize,

    /// A controller-poll marker counts only if it is at most this old.
    pub controller_window_secs: u64,

    /// Maximum file age when a controller is polling.
    pub polled_freshness_secs: u64,

    /// Maximum file age when no controller is polling.
    pub idle_freshness_secs: u64,

    /// Maximum age of the most recent session-start line.
    pub session_max_age_secs: u64,
}

impl Default for CatchupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            liveness_timeout_ms: 3_000,
            controller_scan_lines: 100,
            controller_window_secs: 30,
            polled_freshness_secs: 60,
            idle_freshness_secs: 9 * 60 * 60,
            session_max_age_secs: 30 * 60,
        }
    }
}

impl CatchupConfig {
    /// Returns the liveness query timeout.
    #[inline]
    #[must_use]
    pub const fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    /// Returns the controller-poll detection window.
    #[inline]
    #[must_use]
    pub const fn controller_window(&self) -> Duration {
        Duration::from_secs(self.controller_window_secs)
    }

    /// Returns the maximum acceptable file age given whether a controller is
    /// actively polling the process.
    #[inline]
    #[must_use]
    pub const fn freshness_window(&self, controller_polling: bool) -> Duration {
        if controller_polling {
            Duration::from_secs(self.polled_freshness_secs)
        } else {
            Duration::from_secs(self.idle_freshness_secs)
        }
    }

    /// Returns the maximum age of the session-start line.
    #[inline]
    #[must_use]
    pub const fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }
}

/// Configuration for the per-source activity tracker.
///
/// # Examples
///
/// ```
/// use lt_core::ActivityConfig;
///
/// let config = ActivityConfig::default();
/// assert_eq!(config.sweep_interval_ms, 5_000);
/// assert_eq!(config.inactivity_threshold_ms, 10_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Interval between inactivity sweeps, in milliseconds.
    pub sweep_interval_ms: u64,

    /// Silence after which an active source is demoted, in milliseconds.
    pub inactivity_threshold_ms: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 5_000,
            inactivity_threshold_ms: 10_000,
        }
    }
}

impl ActivityConfig {
    /// Returns the sweep interval.
    #[inline]
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Returns the inactivity threshold.
    #[inline]
    #[must_use]
    pub const fn inactivity_threshold(&self) -> Duration {
        Duration::from_millis(self.inactivity_threshold_ms)
    }
}

/// Root configuration for logtail.
///
/// # Examples
///
/// ```
/// use lt_core::Config;
///
/// let config: Config = serde_json::from_str(r#"{"watch": {"debounce_ms": 50}}"#).unwrap();
/// assert_eq!(config.watch.debounce_ms, 50);
/// assert_eq!(config.activity.sweep_interval_ms, 5_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File watcher configuration.
    pub watch: WatchConfig,

    /// Startup catch-up configuration.
    pub catchup: CatchupConfig,

    /// Activity tracker configuration.
    pub activity: ActivityConfig,

    /// JSON file holding persisted per-source state.
    pub state_path: Utf8PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch: WatchConfig::default(),
            catchup: CatchupConfig::default(),
            activity: ActivityConfig::default(),
            state_path: Utf8PathBuf::from("logtail-state.json"),
        }
    }
}

impl Config {
    /// Loads and validates a configuration file.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file does not exist, or a
    /// parse/validation error otherwise.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_owned()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would stall or spin the core.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] naming the first offending option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.queue_capacity == 0 {
            return Err(ConfigError::invalid_option(
                "watch.queue_capacity",
                "must be greater than zero",
            ));
        }
        if self.watch.extension.is_empty() || self.watch.extension.starts_with('.') {
            return Err(ConfigError::invalid_option(
                "watch.extension",
                "must be a non-empty extension without the leading dot",
            ));
        }
        if self.activity.sweep_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "activity.sweep_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.catchup.enabled && self.catchup.liveness_timeout_ms == 0 {
            return Err(ConfigError::invalid_option(
                "catchup.liveness_timeout_ms",
                "must be greater than zero when catch-up is enabled",
            ));
        }
        Ok(())
    }
}
