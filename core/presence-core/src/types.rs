//! Shared data types for the presence pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Presence category shown to other users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Active,
    Break,
    Offline,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Active => "active",
            Phase::Break => "break",
            Phase::Offline => "offline",
        }
    }

    /// Phase implied purely by time since the last accepted activity.
    pub fn from_idle(idle: Duration, break_after: Duration, offline_after: Duration) -> Phase {
        if idle >= offline_after {
            Phase::Offline
        } else if idle >= break_after {
            Phase::Break
        } else {
            Phase::Active
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Active => "Active",
            Phase::Break => "Break",
            Phase::Offline => "Offline",
        };
        f.write_str(label)
    }
}

/// Where an activity signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    /// Discrete input (pointer, key, scroll, touch). Subject to the debounce window.
    Interaction,
    /// Route/view change. Never debounced.
    Navigation,
}

impl ActivitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivitySource::Interaction => "interaction",
            ActivitySource::Navigation => "navigation",
        }
    }
}

/// Result of offering an activity signal to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityOutcome {
    /// Clock reset and both deadlines rescheduled.
    Accepted,
    /// Interaction arrived inside the debounce window and was dropped.
    Debounced,
    /// Tracker is not initialized; nothing happened.
    Inactive,
}

/// A deadline that fired and still reflects the latest activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub phase: Phase,
    /// Activity epoch the deadline was armed under.
    pub epoch: u64,
    pub last_activity_at: DateTime<Utc>,
    pub idle_for: Duration,
}

/// Read-only diagnostics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityStats {
    pub initialized: bool,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub seconds_since_last_activity: Option<u64>,
    /// Phase implied by elapsed time alone.
    pub inferred_phase: Phase,
    /// Phase applied by the last fired deadline not yet superseded by activity.
    pub phase: Phase,
    pub seconds_until_break: Option<u64>,
    pub seconds_until_offline: Option<u64>,
    pub accepted_activities: u64,
    pub debounced_interactions: u64,
    pub suppressed_audits: u64,
    pub transitions_fired: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BREAK: Duration = Duration::from_secs(20 * 60);
    const OFFLINE: Duration = Duration::from_secs(40 * 60);

    #[test]
    fn from_idle_uses_half_open_ranges() {
        assert_eq!(
            Phase::from_idle(Duration::from_secs(0), BREAK, OFFLINE),
            Phase::Active
        );
        assert_eq!(
            Phase::from_idle(BREAK - Duration::from_secs(1), BREAK, OFFLINE),
            Phase::Active
        );
        assert_eq!(Phase::from_idle(BREAK, BREAK, OFFLINE), Phase::Break);
        assert_eq!(
            Phase::from_idle(OFFLINE - Duration::from_secs(1), BREAK, OFFLINE),
            Phase::Break
        );
        assert_eq!(Phase::from_idle(OFFLINE, BREAK, OFFLINE), Phase::Offline);
    }

    #[test]
    fn phase_serializes_lowercase() {
        let json = serde_json::to_string(&Phase::Offline).unwrap();
        assert_eq!(json, "\"offline\"");
        let parsed: Phase = serde_json::from_str("\"break\"").unwrap();
        assert_eq!(parsed, Phase::Break);
    }
}
