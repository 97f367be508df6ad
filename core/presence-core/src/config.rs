//! Tracker configuration.
//!
//! Loaded from `~/.presence/config.toml`. Every field has a default, so a
//! missing file or a partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PresenceError, Result};

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".presence/config.toml";

/// Upper bound for every window, so deadline arithmetic stays in range.
const MAX_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_break_after_secs")]
    pub break_after_secs: u64,
    #[serde(default = "default_offline_after_secs")]
    pub offline_after_secs: u64,
    #[serde(default = "default_interaction_debounce_secs")]
    pub interaction_debounce_secs: u64,
    #[serde(default = "default_audit_throttle_secs")]
    pub audit_throttle_secs: u64,
    #[serde(default = "default_navigation_poll_ms")]
    pub navigation_poll_ms: u64,
    #[serde(default = "default_deadline_tick_ms")]
    pub deadline_tick_ms: u64,
    #[serde(default = "default_notice_duration_ms")]
    pub notice_duration_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            break_after_secs: default_break_after_secs(),
            offline_after_secs: default_offline_after_secs(),
            interaction_debounce_secs: default_interaction_debounce_secs(),
            audit_throttle_secs: default_audit_throttle_secs(),
            navigation_poll_ms: default_navigation_poll_ms(),
            deadline_tick_ms: default_deadline_tick_ms(),
            notice_duration_ms: default_notice_duration_ms(),
        }
    }
}

/// Config values converted to `Duration`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub break_after: Duration,
    pub offline_after: Duration,
    pub interaction_debounce: Duration,
    pub audit_throttle: Duration,
    pub navigation_poll: Duration,
    pub deadline_tick: Duration,
    pub notice_duration: Duration,
}

impl PresenceConfig {
    pub fn validate(&self) -> Result<()> {
        let max_ms = MAX_WINDOW_SECS * 1000;
        let windows = [
            ("break_after_secs", self.break_after_secs, MAX_WINDOW_SECS),
            ("offline_after_secs", self.offline_after_secs, MAX_WINDOW_SECS),
            (
                "interaction_debounce_secs",
                self.interaction_debounce_secs,
                MAX_WINDOW_SECS,
            ),
            ("audit_throttle_secs", self.audit_throttle_secs, MAX_WINDOW_SECS),
            ("navigation_poll_ms", self.navigation_poll_ms, max_ms),
            ("deadline_tick_ms", self.deadline_tick_ms, max_ms),
            ("notice_duration_ms", self.notice_duration_ms, max_ms),
        ];
        for (name, value, max) in windows {
            if value == 0 {
                return Err(PresenceError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
            if value > max {
                return Err(PresenceError::InvalidConfig(format!(
                    "{} ({}) must not exceed {}",
                    name, value, max
                )));
            }
        }
        if self.offline_after_secs <= self.break_after_secs {
            return Err(PresenceError::InvalidConfig(format!(
                "offline_after_secs ({}) must exceed break_after_secs ({})",
                self.offline_after_secs, self.break_after_secs
            )));
        }
        Ok(())
    }

    pub fn timings(&self) -> Timings {
        Timings {
            break_after: Duration::from_secs(self.break_after_secs),
            offline_after: Duration::from_secs(self.offline_after_secs),
            interaction_debounce: Duration::from_secs(self.interaction_debounce_secs),
            audit_throttle: Duration::from_secs(self.audit_throttle_secs),
            navigation_poll: Duration::from_millis(self.navigation_poll_ms),
            deadline_tick: Duration::from_millis(self.deadline_tick_ms),
            notice_duration: Duration::from_millis(self.notice_duration_ms),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(PresenceError::HomeDirNotFound)?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

/// Loads and validates the config. A missing file yields defaults.
pub fn load_config(path: Option<PathBuf>) -> Result<PresenceConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(PresenceConfig::default());
    }

    let content =
        fs_err::read_to_string(&config_path).map_err(|source| PresenceError::ConfigRead {
            path: config_path.clone(),
            source,
        })?;
    let config =
        toml::from_str::<PresenceConfig>(&content).map_err(|err| PresenceError::ConfigParse {
            path: config_path.clone(),
            details: err.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}

fn default_break_after_secs() -> u64 {
    20 * 60
}

fn default_offline_after_secs() -> u64 {
    40 * 60
}

fn default_interaction_debounce_secs() -> u64 {
    30
}

fn default_audit_throttle_secs() -> u64 {
    2 * 60
}

fn default_navigation_poll_ms() -> u64 {
    1000
}

fn default_deadline_tick_ms() -> u64 {
    1000
}

fn default_notice_duration_ms() -> u64 {
    10_000
}
