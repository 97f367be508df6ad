//! Navigation watcher: route/view changes as a secondary activity signal.
//!
//! Polls a [`LocationProvider`] and records activity whenever the observed
//! location differs from the previous observation. No debounce; navigation is
//! already paced by the user.

use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};

use crate::scheduler::PresenceScheduler;
use crate::types::{ActivityOutcome, ActivitySource};

pub trait LocationProvider: Send + Sync {
    /// Current route/view, or None if it cannot be read right now.
    fn current_location(&self) -> Option<String>;
}

/// Settable location shared between the host and the watcher.
#[derive(Debug, Default)]
pub struct SharedLocation {
    current: Mutex<Option<String>>,
}

impl SharedLocation {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(Some(initial.into())),
        }
    }

    pub fn set(&self, location: impl Into<String>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(location.into());
    }
}

impl LocationProvider for SharedLocation {
    fn current_location(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub struct NavigationWatcher {
    provider: Arc<dyn LocationProvider>,
    scheduler: Arc<PresenceScheduler>,
    previous: Option<String>,
}

impl NavigationWatcher {
    pub fn new(provider: Arc<dyn LocationProvider>, scheduler: Arc<PresenceScheduler>) -> Self {
        Self {
            provider,
            scheduler,
            previous: None,
        }
    }

    /// Forgets the last observation; the next poll only sets a baseline.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// One observation. Returns the outcome if a change was recorded.
    pub fn poll_once(&mut self) -> Option<ActivityOutcome> {
        let current = self.provider.current_location()?;
        let previous = self.previous.replace(current.clone())?;
        if previous == current {
            return None;
        }

        tracing::debug!(from = %previous, to = %current, "Navigation detected");
        Some(self.scheduler.record_activity(
            ActivitySource::Navigation,
            json!({ "from": previous, "to": current }),
        ))
    }
}
