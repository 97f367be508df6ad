//! Side effects of a fired deadline.
//!
//! Three effects per transition: status update, audit record, user notice.
//! Each is queued on its own lane and returns to the caller at once; an `Err`
//! or a panic from one collaborator is logged and never stops the others.
//!
//! Status writes share one lane, so they land in the order they were queued.
//! Each re-checks its [`StatusCheck`] right before writing, which is what keeps
//! a superseded Break from landing after the Active that superseded it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::collaborators::{AuditRecord, Collaborators, Notice};
use crate::dispatch::{EffectDispatcher, Lane};
use crate::error::CollaboratorError;
use crate::types::{Phase, Transition};

/// Whether a queued status write still reflects the scheduler's state.
pub type StatusCheck = Arc<dyn Fn() -> bool + Send + Sync>;

pub struct TransitionHandler {
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    notice_duration: Duration,
    dispatcher: EffectDispatcher,
}

impl TransitionHandler {
    pub fn new(
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        notice_duration: Duration,
    ) -> Self {
        Self {
            collaborators,
            clock,
            notice_duration,
            dispatcher: EffectDispatcher::new(),
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Queues all three effects for `transition`. Returns false, queuing
    /// nothing, if it was already superseded.
    pub fn handle(&self, transition: &Transition, still_current: StatusCheck) -> bool {
        if !still_current() {
            tracing::debug!(
                phase = %transition.phase,
                epoch = transition.epoch,
                "Transition superseded before dispatch"
            );
            return false;
        }

        tracing::info!(
            phase = %transition.phase,
            idle_secs = transition.idle_for.as_secs(),
            last_activity_at = %transition.last_activity_at.to_rfc3339(),
            "Automatic presence transition"
        );

        self.queue_status(transition.phase, still_current);

        self.write_audit(AuditRecord::automatic_status_change(
            transition.phase,
            transition.last_activity_at,
            transition.idle_for,
            self.clock.wall_now(),
        ));

        let notice =
            Notice::for_transition(transition.phase, transition.idle_for, self.notice_duration);
        let notifier = Arc::clone(&self.collaborators.notifier);
        self.dispatcher.submit(
            Lane::Notice,
            Box::new(move || {
                contain("show_notice", || notifier.show(&notice));
            }),
        );
        true
    }

    /// Queues a write putting presence back to Active after a Break/Offline phase.
    pub fn restore_active(&self, previous: Phase, still_current: StatusCheck) {
        tracing::info!(previous = %previous, "Restoring presence to Active");
        self.queue_status(Phase::Active, still_current);
    }

    /// Queues an audit record on the audit lane.
    pub fn write_audit(&self, record: AuditRecord) {
        let audit = Arc::clone(&self.collaborators.audit);
        self.dispatcher.submit(
            Lane::Audit,
            Box::new(move || {
                contain("audit_write", || audit.write(&record));
            }),
        );
    }

    /// Blocks until every queued effect has run.
    pub fn flush(&self) {
        self.dispatcher.flush();
    }

    fn queue_status(&self, phase: Phase, still_current: StatusCheck) {
        let status = Arc::clone(&self.collaborators.status);
        self.dispatcher.submit(
            Lane::Status,
            Box::new(move || {
                if !still_current() {
                    tracing::debug!(phase = %phase, "Status write superseded by newer activity");
                    return;
                }
                contain("set_presence", || status.set_presence(phase));
            }),
        );
    }
}

/// Runs one collaborator call, logging and swallowing both errors and panics.
pub(crate) fn contain<F>(effect: &'static str, f: F) -> bool
where
    F: FnOnce() -> Result<(), CollaboratorError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::warn!(effect, error = %err, "Presence side effect failed");
            false
        }
        Err(payload) => {
            tracing::warn!(
                effect,
                panic = %panic_message(payload.as_ref()),
                "Presence side effect panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::ACTION_AUTOMATIC_STATUS_CHANGE;
    use crate::memory::{MemoryAuditSink, MemoryNotifier, MemoryPresenceStore};
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        status: Arc<MemoryPresenceStore>,
        audit: Arc<MemoryAuditSink>,
        notifier: Arc<MemoryNotifier>,
        handler: TransitionHandler,
    }

    fn fixture() -> Fixture {
        let status = Arc::new(MemoryPresenceStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let handler = TransitionHandler::new(
            Collaborators {
                status: status.clone(),
                audit: audit.clone(),
                notifier: notifier.clone(),
            },
            Arc::new(ManualClock::new()),
            Duration::from_secs(10),
        );
        Fixture {
            status,
            audit,
            notifier,
            handler,
        }
    }

    fn break_transition() -> Transition {
        Transition {
            phase: Phase::Break,
            epoch: 1,
            last_activity_at: Utc::now(),
            idle_for: Duration::from_secs(20 * 60),
        }
    }

    fn current(value: bool) -> StatusCheck {
        Arc::new(move || value)
    }

    #[test]
    fn all_effects_run_on_success() {
        let f = fixture();
        assert!(f.handler.handle(&break_transition(), current(true)));
        f.handler.flush();

        assert_eq!(f.status.history(), vec![Phase::Break]);
        assert_eq!(
            f.audit.records_with_action(ACTION_AUTOMATIC_STATUS_CHANGE).len(),
            1
        );
        assert_eq!(f.notifier.notices()[0].duration, Duration::from_secs(10));
    }

    #[test]
    fn status_error_does_not_block_audit_or_notice() {
        let f = fixture();
        f.status.set_failing(true);

        f.handler.handle(&break_transition(), current(true));
        f.handler.flush();

        assert!(f.status.history().is_empty());
        assert_eq!(f.audit.records().len(), 1);
        assert_eq!(f.notifier.notices().len(), 1);
    }

    #[test]
    fn status_panic_is_contained_and_lane_survives() {
        let f = fixture();
        f.status.set_panicking(true);

        f.handler.handle(&break_transition(), current(true));
        f.handler.flush();
        assert!(f.status.history().is_empty());
        assert_eq!(f.audit.records().len(), 1);
        assert_eq!(f.notifier.notices().len(), 1);

        f.status.set_panicking(false);
        f.handler.restore_active(Phase::Break, current(true));
        f.handler.flush();
        assert_eq!(f.status.history(), vec![Phase::Active]);
    }

    #[test]
    fn audit_and_notice_failures_are_independent() {
        let f = fixture();
        f.audit.set_failing(true);
        f.notifier.set_failing(true);

        f.handler.handle(&break_transition(), current(true));
        f.handler.flush();

        assert_eq!(f.status.history(), vec![Phase::Break]);
        assert!(f.audit.records().is_empty());
        assert!(f.notifier.notices().is_empty());
    }

    #[test]
    fn superseded_transition_has_no_effects() {
        let f = fixture();
        assert!(!f.handler.handle(&break_transition(), current(false)));
        f.handler.flush();

        assert!(f.status.history().is_empty());
        assert!(f.audit.records().is_empty());
        assert!(f.notifier.notices().is_empty());
    }

    #[test]
    fn status_write_rechecks_currency_when_it_runs() {
        let f = fixture();
        let live = Arc::new(AtomicBool::new(true));
        let check = Arc::clone(&live);

        f.handler.handle(
            &break_transition(),
            Arc::new(move || check.load(Ordering::SeqCst)),
        );
        // Superseded after dispatch but possibly before the lane ran it.
        live.store(false, Ordering::SeqCst);
        f.handler.restore_active(Phase::Break, current(true));
        f.handler.flush();

        assert_eq!(f.status.history().last(), Some(&Phase::Active));
    }
}
