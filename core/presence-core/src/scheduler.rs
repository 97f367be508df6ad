//! Presence scheduler: the activity clock and the two inactivity deadlines.
//!
//! All mutable presence state sits behind a single mutex. Every accepted
//! activity bumps `epoch`, cancels both deadlines and re-arms them from the
//! new activity time. A deadline remembers the epoch it was armed under, so a
//! firing that races with newer activity is recognised as stale and dropped.
//!
//! Collaborator calls (status, audit, notice) are queued on effect lanes
//! after the lock is released; nothing here waits on them.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::collaborators::{AuditRecord, Collaborators};
use crate::config::Timings;
use crate::throttle::AuditThrottle;
use crate::transition::{StatusCheck, TransitionHandler};
use crate::types::{ActivityOutcome, ActivitySource, ActivityStats, Phase, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Deadline {
    phase: Phase,
    due: Instant,
    epoch: u64,
}

impl Deadline {
    /// None if `now + after` is not representable; such a deadline never fires.
    fn arm(phase: Phase, now: Instant, after: Duration, epoch: u64) -> Option<Deadline> {
        match now.checked_add(after) {
            Some(due) => Some(Deadline { phase, due, epoch }),
            None => {
                tracing::warn!(
                    phase = %phase,
                    after_secs = after.as_secs(),
                    "Deadline out of range, not armed"
                );
                None
            }
        }
    }
}

#[derive(Debug)]
struct PresenceState {
    initialized: bool,
    epoch: u64,
    last_activity_at: Option<Instant>,
    last_activity_wall: Option<DateTime<Utc>>,
    last_interaction_at: Option<Instant>,
    break_deadline: Option<Deadline>,
    offline_deadline: Option<Deadline>,
    phase: Phase,
    throttle: AuditThrottle,
    accepted: u64,
    debounced: u64,
    transitions: u64,
}

impl PresenceState {
    fn new(timings: &Timings) -> Self {
        Self {
            initialized: false,
            epoch: 0,
            last_activity_at: None,
            last_activity_wall: None,
            last_interaction_at: None,
            break_deadline: None,
            offline_deadline: None,
            phase: Phase::Active,
            throttle: AuditThrottle::new(timings.audit_throttle),
            accepted: 0,
            debounced: 0,
            transitions: 0,
        }
    }

    fn cancel_deadlines(&mut self) {
        self.break_deadline = None;
        self.offline_deadline = None;
    }

    /// Cancel, reset the clock, re-arm both deadlines from `now`.
    fn rearm(&mut self, now: Instant, wall: DateTime<Utc>, timings: &Timings) {
        self.cancel_deadlines();
        self.epoch = self.epoch.wrapping_add(1);
        self.last_activity_at = Some(now);
        self.last_activity_wall = Some(wall);
        // Offline is armed from the same activity, not chained off Break firing.
        self.break_deadline = Deadline::arm(Phase::Break, now, timings.break_after, self.epoch);
        self.offline_deadline =
            Deadline::arm(Phase::Offline, now, timings.offline_after, self.epoch);
        self.phase = Phase::Active;
    }

    fn take_due(&mut self, now: Instant) -> Vec<Deadline> {
        let epoch = self.epoch;
        let mut due = Vec::with_capacity(2);
        for slot in [&mut self.break_deadline, &mut self.offline_deadline] {
            if let Some(deadline) = *slot {
                if deadline.due <= now {
                    *slot = None;
                    if deadline.epoch == epoch {
                        due.push(deadline);
                    }
                }
            }
        }
        due.sort_by_key(|deadline| deadline.due);
        due
    }
}

pub struct PresenceScheduler {
    timings: Timings,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<PresenceState>>,
    transitions: TransitionHandler,
}

fn lock(state: &Mutex<PresenceState>) -> MutexGuard<'_, PresenceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PresenceScheduler {
    pub fn new(timings: Timings, clock: Arc<dyn Clock>, collaborators: Collaborators) -> Self {
        let transitions =
            TransitionHandler::new(collaborators, Arc::clone(&clock), timings.notice_duration);
        Self {
            state: Arc::new(Mutex::new(PresenceState::new(&timings))),
            timings,
            clock,
            transitions,
        }
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    fn lock_state(&self) -> MutexGuard<'_, PresenceState> {
        lock(&self.state)
    }

    /// Valid while no activity has superseded the given epoch.
    fn epoch_check(&self, epoch: u64) -> StatusCheck {
        let state = Arc::clone(&self.state);
        Arc::new(move || lock(&state).epoch == epoch)
    }

    /// Valid until a later deadline moves presence off Active again.
    fn active_check(&self) -> StatusCheck {
        let state = Arc::clone(&self.state);
        Arc::new(move || lock(&state).phase == Phase::Active)
    }

    /// Marks the scheduler live, arms the initial deadlines and, when a
    /// previous run left presence at Break or Offline, queues a write back to
    /// Active. Returns false (and does nothing) if already live.
    pub fn start(&self) -> bool {
        let now = self.clock.now();
        let wall = self.clock.wall_now();
        let previous = {
            let mut state = self.lock_state();
            if state.initialized {
                return false;
            }
            state.initialized = true;
            state.last_interaction_at = None;
            let previous = state.phase;
            state.rearm(now, wall, &self.timings);
            tracing::info!(epoch = state.epoch, "Presence tracking started");
            previous
        };

        if previous != Phase::Active {
            self.transitions
                .restore_active(previous, self.active_check());
        }
        true
    }

    /// Cancels both deadlines and refuses further activity until restarted.
    /// Returns false if not live.
    pub fn stop(&self) -> bool {
        let mut state = self.lock_state();
        state.cancel_deadlines();
        if !state.initialized {
            return false;
        }
        state.initialized = false;
        tracing::info!(epoch = state.epoch, "Presence tracking stopped");
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_state().initialized
    }

    /// Offers an activity signal. Interactions inside the debounce window are
    /// dropped; everything else resets the clock and both deadlines.
    pub fn record_activity(&self, source: ActivitySource, meta: Value) -> ActivityOutcome {
        let now = self.clock.now();
        let wall = self.clock.wall_now();

        let (resumed_from, epoch, audit_admitted) = {
            let mut state = self.lock_state();
            if !state.initialized {
                return ActivityOutcome::Inactive;
            }

            if source == ActivitySource::Interaction {
                if let Some(last) = state.last_interaction_at {
                    if now.saturating_duration_since(last) < self.timings.interaction_debounce {
                        state.debounced = state.debounced.saturating_add(1);
                        return ActivityOutcome::Debounced;
                    }
                }
                state.last_interaction_at = Some(now);
            }

            let previous = state.phase;
            state.rearm(now, wall, &self.timings);
            state.accepted = state.accepted.saturating_add(1);
            let audit_admitted = state.throttle.admit(now);
            let resumed_from = (previous != Phase::Active).then_some(previous);
            (resumed_from, state.epoch, audit_admitted)
        };

        tracing::debug!(
            source = source.as_str(),
            epoch,
            audit = audit_admitted,
            "Activity accepted"
        );

        if let Some(previous) = resumed_from {
            self.transitions
                .restore_active(previous, self.active_check());
        }

        if audit_admitted {
            self.transitions
                .write_audit(AuditRecord::routine_activity(source, &meta, wall));
        }

        ActivityOutcome::Accepted
    }

    /// Fires every due deadline that still reflects the latest activity, in
    /// due order, and runs the transition side effects outside the lock.
    pub fn fire_due(&self) -> Vec<Transition> {
        let now = self.clock.now();
        let fired = {
            let mut state = self.lock_state();
            if !state.initialized {
                return Vec::new();
            }
            let (Some(last_at), Some(last_wall)) =
                (state.last_activity_at, state.last_activity_wall)
            else {
                return Vec::new();
            };

            let due = state.take_due(now);
            let mut fired = Vec::with_capacity(due.len());
            for deadline in due {
                state.phase = deadline.phase;
                state.transitions = state.transitions.saturating_add(1);
                fired.push(Transition {
                    phase: deadline.phase,
                    epoch: deadline.epoch,
                    last_activity_at: last_wall,
                    idle_for: deadline.due.saturating_duration_since(last_at),
                });
            }
            fired
        };

        for transition in &fired {
            self.transitions
                .handle(transition, self.epoch_check(transition.epoch));
        }
        fired
    }

    /// Blocks until every queued collaborator call has run.
    pub fn flush_effects(&self) {
        self.transitions.flush();
    }

    /// Time until the earliest pending deadline, or None when nothing is armed.
    pub fn time_until_next_deadline(&self) -> Option<Duration> {
        let now = self.clock.now();
        let state = self.lock_state();
        if !state.initialized {
            return None;
        }
        [state.break_deadline, state.offline_deadline]
            .into_iter()
            .flatten()
            .map(|deadline| deadline.due.saturating_duration_since(now))
            .min()
    }

    pub fn stats(&self) -> ActivityStats {
        let now = self.clock.now();
        let state = self.lock_state();
        let idle = state
            .last_activity_at
            .map(|at| now.saturating_duration_since(at));
        let inferred_phase = idle
            .map(|idle| {
                Phase::from_idle(idle, self.timings.break_after, self.timings.offline_after)
            })
            .unwrap_or(Phase::Active);
        let until = |deadline: Option<Deadline>| {
            deadline.map(|deadline| deadline.due.saturating_duration_since(now).as_secs())
        };

        ActivityStats {
            initialized: state.initialized,
            last_activity_at: state.last_activity_wall,
            seconds_since_last_activity: idle.map(|idle| idle.as_secs()),
            inferred_phase,
            phase: state.phase,
            seconds_until_break: until(state.break_deadline),
            seconds_until_offline: until(state.offline_deadline),
            accepted_activities: state.accepted,
            debounced_interactions: state.debounced,
            suppressed_audits: state.throttle.suppressed(),
            transitions_fired: state.transitions,
        }
    }
}
