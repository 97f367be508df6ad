//! Interaction capture: discrete user input as an activity signal.
//!
//! The host feeds input through an [`InteractionSource`]. Capture forwards
//! every event to the scheduler, which applies the debounce window atomically
//! with the clock reset.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};

use crate::scheduler::PresenceScheduler;
use crate::types::{ActivityOutcome, ActivitySource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    PointerDown,
    KeyDown,
    Scroll,
    TouchStart,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::PointerDown => "pointer_down",
            InteractionKind::KeyDown => "key_down",
            InteractionKind::Scroll => "scroll",
            InteractionKind::TouchStart => "touch_start",
        }
    }

    /// Parses the short names used on the agent's stdin.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pointer" | "pointer_down" | "click" => Some(InteractionKind::PointerDown),
            "key" | "key_down" => Some(InteractionKind::KeyDown),
            "scroll" => Some(InteractionKind::Scroll),
            "touch" | "touch_start" => Some(InteractionKind::TouchStart),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionEvent {
    pub kind: InteractionKind,
    /// What the input landed on, if the host knows.
    pub target: Option<String>,
}

impl InteractionEvent {
    pub fn new(kind: InteractionKind) -> Self {
        Self { kind, target: None }
    }
}

pub type InteractionListener = Arc<dyn Fn(InteractionEvent) + Send + Sync>;

/// Global input subscription. At most one listener is attached at a time.
pub trait InteractionSource: Send + Sync {
    fn subscribe(&self, listener: InteractionListener);
    fn unsubscribe(&self);
}

/// In-process interaction source. Hosts call [`InteractionHub::emit`] from
/// their input loop; events emitted while nobody is subscribed are dropped.
#[derive(Default)]
pub struct InteractionHub {
    listener: Mutex<Option<InteractionListener>>,
}

impl InteractionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: InteractionEvent) {
        // Clone out so the listener runs without the hub lock held.
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(event);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl InteractionSource for InteractionHub {
    fn subscribe(&self, listener: InteractionListener) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn unsubscribe(&self) {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

pub struct InteractionCapture {
    scheduler: Arc<PresenceScheduler>,
}

impl InteractionCapture {
    pub fn new(scheduler: Arc<PresenceScheduler>) -> Self {
        Self { scheduler }
    }

    pub fn handle(&self, event: InteractionEvent) -> ActivityOutcome {
        let meta = json!({
            "kind": event.kind.as_str(),
            "target": event.target,
        });
        let outcome = self
            .scheduler
            .record_activity(ActivitySource::Interaction, meta);
        if outcome == ActivityOutcome::Debounced {
            tracing::trace!(kind = event.kind.as_str(), "Interaction debounced");
        }
        outcome
    }

    /// Listener to hand to an [`InteractionSource`].
    pub fn listener(self: &Arc<Self>) -> InteractionListener {
        let capture = Arc::clone(self);
        Arc::new(move |event| {
            capture.handle(event);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::Collaborators;
    use crate::config::PresenceConfig;
    use crate::memory::{MemoryAuditSink, MemoryNotifier, MemoryPresenceStore};
    use std::time::Duration;

    fn scheduler(clock: Arc<ManualClock>) -> Arc<PresenceScheduler> {
        Arc::new(PresenceScheduler::new(
            PresenceConfig::default().timings(),
            clock,
            Collaborators {
                status: Arc::new(MemoryPresenceStore::new()),
                audit: Arc::new(MemoryAuditSink::new()),
                notifier: Arc::new(MemoryNotifier::new()),
            },
        ))
    }

    #[test]
    fn parse_accepts_short_and_long_names() {
        assert_eq!(InteractionKind::parse("pointer"), Some(InteractionKind::PointerDown));
        assert_eq!(InteractionKind::parse(" KEY "), Some(InteractionKind::KeyDown));
        assert_eq!(InteractionKind::parse("touch_start"), Some(InteractionKind::TouchStart));
        assert_eq!(InteractionKind::parse("hover"), None);
    }

    #[test]
    fn hub_delivers_only_while_subscribed() {
        let clock = Arc::new(ManualClock::new());
        let scheduler = scheduler(clock.clone());
        scheduler.start();
        let capture = Arc::new(InteractionCapture::new(Arc::clone(&scheduler)));
        let hub = InteractionHub::new();

        hub.emit(InteractionEvent::new(InteractionKind::Scroll));
        assert_eq!(scheduler.stats().accepted_activities, 0);

        hub.subscribe(capture.listener());
        assert!(hub.is_subscribed());
        hub.emit(InteractionEvent::new(InteractionKind::Scroll));
        assert_eq!(scheduler.stats().accepted_activities, 1);

        hub.unsubscribe();
        clock.advance(Duration::from_secs(60));
        hub.emit(InteractionEvent::new(InteractionKind::KeyDown));
        assert_eq!(scheduler.stats().accepted_activities, 1);
    }

    #[test]
    fn concurrent_bursts_accept_exactly_one_interaction() {
        let clock = Arc::new(ManualClock::new());
        let scheduler = scheduler(clock);
        scheduler.start();
        let capture = Arc::new(InteractionCapture::new(Arc::clone(&scheduler)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let capture = Arc::clone(&capture);
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| {
                            capture.handle(InteractionEvent::new(InteractionKind::PointerDown))
                                == ActivityOutcome::Accepted
                        })
                        .count()
                })
            })
            .collect();
        let accepted: usize = handles
            .into_iter()
            .map(|handle| handle.join().expect("burst thread"))
            .sum();

        assert_eq!(accepted, 1);
        let stats = scheduler.stats();
        assert_eq!(stats.accepted_activities, 1);
        assert_eq!(stats.debounced_interactions, 199);
    }
}
