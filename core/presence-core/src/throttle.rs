//! Rate limit for routine-activity audit writes.
//!
//! Transition audit writes never pass through here.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct AuditThrottle {
    window: Duration,
    last_emit_at: Option<Instant>,
    suppressed: u64,
}

impl AuditThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emit_at: None,
            suppressed: 0,
        }
    }

    /// Returns true (and starts a new window) if a routine write may happen at `now`.
    pub fn admit(&mut self, now: Instant) -> bool {
        let open = match self.last_emit_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.window,
        };
        if open {
            self.last_emit_at = Some(now);
        } else {
            self.suppressed = self.suppressed.saturating_add(1);
        }
        open
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    pub fn last_emit_at(&self) -> Option<Instant> {
        self.last_emit_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(120);

    #[test]
    fn first_event_is_admitted() {
        let mut throttle = AuditThrottle::new(WINDOW);
        assert!(throttle.admit(Instant::now()));
        assert_eq!(throttle.suppressed(), 0);
    }

    #[test]
    fn events_inside_window_are_suppressed_and_counted() {
        let start = Instant::now();
        let mut throttle = AuditThrottle::new(WINDOW);

        assert!(throttle.admit(start));
        assert!(!throttle.admit(start + Duration::from_secs(30)));
        assert!(!throttle.admit(start + Duration::from_secs(119)));
        assert_eq!(throttle.suppressed(), 2);
        assert_eq!(throttle.last_emit_at(), Some(start));
    }

    #[test]
    fn window_is_measured_from_last_admitted_event() {
        let start = Instant::now();
        let mut throttle = AuditThrottle::new(WINDOW);

        assert!(throttle.admit(start));
        assert!(!throttle.admit(start + Duration::from_secs(100)));
        assert!(throttle.admit(start + WINDOW));
        assert!(!throttle.admit(start + WINDOW + Duration::from_secs(119)));
        assert!(throttle.admit(start + WINDOW * 2));
    }
}
