//! Session records and the catch-up decision that seeds them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SourceId;

/// Which side the monitored server's scenario puts participants on.
///
/// Derived from substrings of the scenario label.
///
/// # Examples
///
/// ```
/// use lt_core::Side;
///
/// assert_eq!(Side::from_scenario("Scenario_Town_Checkpoint_Security"), Side::Security);
/// assert_eq!(Side::from_scenario("Scenario_Town_Checkpoint_Insurgents"), Side::Insurgents);
/// assert_eq!(Side::from_scenario("Scenario_Town_Push"), Side::Unknown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Participants play the security faction.
    Security,
    /// Participants play the insurgent faction.
    Insurgents,
    /// The scenario label does not name a side.
    #[default]
    Unknown,
}

impl Side {
    /// Derives the side from a scenario label (case-insensitive).
    #[must_use]
    pub fn from_scenario(scenario: &str) -> Self {
        let lower = scenario.to_ascii_lowercase();
        if lower.contains("security") {
            Self::Security
        } else if lower.contains("insurgents") {
            Self::Insurgents
        } else {
            Self::Unknown
        }
    }

    /// Returns the lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Insurgents => "insurgents",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live status reported by the monitored process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Map currently loaded, if the process reported one.
    pub map: Option<String>,
    /// Connected player count, if reported.
    pub player_count: Option<u32>,
}

impl ServerStatus {
    /// Creates a status reporting the given map.
    #[must_use]
    pub fn with_map(map: impl Into<String>) -> Self {
        Self {
            map: Some(map.into()),
            player_count: None,
        }
    }

    /// Returns the reported map name if it is present and non-blank.
    #[must_use]
    pub fn current_map(&self) -> Option<&str> {
        self.map.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}

/// Outcome of a successful startup catch-up check for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchupDecision {
    /// Map named by the most recent session-start line.
    pub map: String,
    /// Scenario label from the same line.
    pub scenario: String,
    /// Timestamp of the session-start line.
    pub started_at: DateTime<Utc>,
    /// Byte offset where the session-start line begins.
    pub replay_from: u64,
    /// Position of the session-start line counted back from the end of the
    /// file; the last line is 1.
    pub lines_from_end: usize,
    /// Byte offset marking "now"; replay never reads past it.
    pub end_offset: u64,
    /// Side derived from the scenario label.
    pub side: Side,
}

/// Identifier of a session record in the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open session (e.g. a match) on a monitored server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Repository identifier.
    pub id: SessionId,
    /// Source the session belongs to.
    pub source_id: SourceId,
    /// Map being played.
    pub map: String,
    /// Scenario label.
    pub scenario: String,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Participant side.
    pub side: Side,
}

/// Parameters for creating a session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    /// Source the session belongs to.
    pub source_id: SourceId,
    /// Map being played.
    pub map: String,
    /// Scenario label.
    pub scenario: String,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Participant side.
    pub side: Side,
}

impl NewSession {
    /// Builds the session parameters from a catch-up decision.
    #[must_use]
    pub fn from_decision(source_id: SourceId, decision: &CatchupDecision) -> Self {
        Self {
            source_id,
            map: decision.map.clone(),
            scenario: decision.scenario.clone(),
            started_at: decision.started_at,
            side: decision.side,
        }
    }
}
