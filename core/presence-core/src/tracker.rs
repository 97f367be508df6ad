//! Lifecycle controller: the one object a host owns.
//!
//! `initialize()` wires interaction capture, the navigation watcher and the
//! initial deadlines; `destroy()` undoes all of it. Both are idempotent and
//! return whether they changed anything.
//!
//! In background drive (the default) two named workers run:
//! `presence-navigation` polls the location provider, `presence-deadlines`
//! sleeps until the nearest deadline (capped at the tick interval) and fires
//! it. In manual drive the host calls [`PresenceTracker::tick`] itself.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::capture::{InteractionCapture, InteractionSource};
use crate::clock::Clock;
use crate::collaborators::Collaborators;
use crate::config::{PresenceConfig, Timings};
use crate::navigation::{LocationProvider, NavigationWatcher};
use crate::scheduler::PresenceScheduler;
use crate::types::{ActivityStats, Transition};
use crate::worker::PeriodicWorker;

/// Everything the tracker needs from its host.
#[derive(Clone)]
pub struct TrackerParts {
    pub clock: Arc<dyn Clock>,
    pub interactions: Arc<dyn InteractionSource>,
    pub location: Arc<dyn LocationProvider>,
    pub collaborators: Collaborators,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drive {
    Background,
    Manual,
}

#[derive(Default)]
struct Lifecycle {
    initialized: bool,
    workers: Vec<PeriodicWorker>,
}

pub struct PresenceTracker {
    timings: Timings,
    drive: Drive,
    scheduler: Arc<PresenceScheduler>,
    capture: Arc<InteractionCapture>,
    interactions: Arc<dyn InteractionSource>,
    watcher: Arc<Mutex<NavigationWatcher>>,
    lifecycle: Mutex<Lifecycle>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PresenceTracker {
    pub fn new(config: PresenceConfig, parts: TrackerParts) -> Self {
        let timings = config.timings();
        let scheduler = Arc::new(PresenceScheduler::new(
            timings,
            parts.clock,
            parts.collaborators,
        ));
        let capture = Arc::new(InteractionCapture::new(Arc::clone(&scheduler)));
        let watcher = NavigationWatcher::new(parts.location, Arc::clone(&scheduler));
        Self {
            timings,
            drive: Drive::Background,
            scheduler,
            capture,
            interactions: parts.interactions,
            watcher: Arc::new(Mutex::new(watcher)),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// No background workers; the host drives time through [`Self::tick`].
    pub fn manual_drive(mut self) -> Self {
        self.drive = Drive::Manual;
        self
    }

    pub fn scheduler(&self) -> &Arc<PresenceScheduler> {
        &self.scheduler
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.lifecycle).initialized
    }

    pub fn initialize(&self) -> bool {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.initialized {
            tracing::debug!("Presence tracker already initialized");
            return false;
        }

        self.scheduler.start();
        {
            let mut watcher = lock(&self.watcher);
            watcher.reset();
            watcher.poll_once();
        }
        self.interactions.subscribe(self.capture.listener());

        if self.drive == Drive::Background {
            lifecycle.workers = self.spawn_workers();
        }
        lifecycle.initialized = true;
        tracing::info!(
            break_after_secs = self.timings.break_after.as_secs(),
            offline_after_secs = self.timings.offline_after.as_secs(),
            background = self.drive == Drive::Background,
            "Presence tracker initialized"
        );
        true
    }

    pub fn destroy(&self) -> bool {
        let mut lifecycle = lock(&self.lifecycle);
        if !lifecycle.initialized {
            return false;
        }

        self.interactions.unsubscribe();
        self.scheduler.stop();
        for worker in lifecycle.workers.drain(..) {
            worker.stop();
        }
        lifecycle.initialized = false;
        tracing::info!("Presence tracker destroyed");
        true
    }

    /// One navigation poll plus any due deadlines. Used in manual drive.
    pub fn tick(&self) -> Vec<Transition> {
        if !self.is_initialized() {
            return Vec::new();
        }
        lock(&self.watcher).poll_once();
        self.scheduler.fire_due()
    }

    pub fn activity_stats(&self) -> ActivityStats {
        self.scheduler.stats()
    }

    /// Waits for queued status, audit and notice calls. Hosts call this
    /// before exiting so nothing queued is lost.
    pub fn flush_effects(&self) {
        self.scheduler.flush_effects();
    }

    fn spawn_workers(&self) -> Vec<PeriodicWorker> {
        let mut workers = Vec::with_capacity(2);

        let watcher = Arc::clone(&self.watcher);
        let poll_interval = self.timings.navigation_poll;
        match PeriodicWorker::spawn(
            "presence-navigation",
            move || poll_interval,
            move || {
                lock(&watcher).poll_once();
            },
        ) {
            Ok(worker) => workers.push(worker),
            Err(err) => tracing::warn!(error = %err, "Navigation watcher unavailable"),
        }

        let waiter = Arc::clone(&self.scheduler);
        let firer = Arc::clone(&self.scheduler);
        let max_wait = self.timings.deadline_tick;
        match PeriodicWorker::spawn(
            "presence-deadlines",
            move || {
                waiter
                    .time_until_next_deadline()
                    .map_or(max_wait, |until| until.min(max_wait))
            },
            move || {
                firer.fire_due();
            },
        ) {
            Ok(worker) => workers.push(worker),
            Err(err) => tracing::warn!(error = %err, "Deadline worker unavailable"),
        }

        workers
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.destroy();
    }
}
