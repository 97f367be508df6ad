//! Effect lanes: collaborator calls kept off the capture and scheduling path.
//!
//! Status, audit and notice each get a named thread fed by a channel, so a
//! stalled store delays neither the other effects nor the caller. Within one
//! lane effects run in submission order.

use std::sync::mpsc::{self, SendError};
use std::sync::{Mutex, PoisonError};
use std::thread;

pub(crate) type Effect = Box<dyn FnOnce() + Send + 'static>;

enum Job {
    Run(Effect),
    Flush(mpsc::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lane {
    Status,
    Audit,
    Notice,
}

impl Lane {
    const ALL: [Lane; 3] = [Lane::Status, Lane::Audit, Lane::Notice];

    fn thread_name(self) -> &'static str {
        match self {
            Lane::Status => "presence-status",
            Lane::Audit => "presence-audit",
            Lane::Notice => "presence-notice",
        }
    }

    fn index(self) -> usize {
        match self {
            Lane::Status => 0,
            Lane::Audit => 1,
            Lane::Notice => 2,
        }
    }
}

pub(crate) struct EffectDispatcher {
    /// None when the lane thread could not be spawned; effects then run inline.
    lanes: Vec<Option<mpsc::Sender<Job>>>,
    inline_gate: Mutex<()>,
}

impl EffectDispatcher {
    pub(crate) fn new() -> Self {
        let lanes = Lane::ALL.iter().map(|lane| spawn_lane(*lane)).collect();
        Self {
            lanes,
            inline_gate: Mutex::new(()),
        }
    }

    /// Queues `effect` on `lane` and returns immediately.
    pub(crate) fn submit(&self, lane: Lane, effect: Effect) {
        let effect = match &self.lanes[lane.index()] {
            Some(jobs) => match jobs.send(Job::Run(effect)) {
                Ok(()) => return,
                Err(SendError(Job::Run(effect))) => effect,
                Err(SendError(Job::Flush(_))) => return,
            },
            None => effect,
        };
        let _gate = self
            .inline_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        effect();
    }

    /// Blocks until every effect queued so far, on every lane, has run.
    pub(crate) fn flush(&self) {
        let pending: Vec<mpsc::Receiver<()>> = self
            .lanes
            .iter()
            .flatten()
            .filter_map(|jobs| {
                let (done, finished) = mpsc::channel();
                jobs.send(Job::Flush(done)).ok().map(|()| finished)
            })
            .collect();
        for finished in pending {
            let _ = finished.recv();
        }
    }
}

fn spawn_lane(lane: Lane) -> Option<mpsc::Sender<Job>> {
    let (jobs, queue) = mpsc::channel::<Job>();
    // Detached: the thread drains what is queued and exits once the
    // dispatcher (the only sender) is dropped.
    let spawned = thread::Builder::new()
        .name(lane.thread_name().to_string())
        .spawn(move || {
            for job in queue {
                match job {
                    Job::Run(effect) => effect(),
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
    match spawned {
        Ok(_) => Some(jobs),
        Err(err) => {
            tracing::warn!(
                lane = lane.thread_name(),
                error = %err,
                "Effect lane unavailable, running effects inline"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn effects_on_one_lane_run_in_order() {
        let dispatcher = EffectDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for n in 0..20 {
            let seen = Arc::clone(&seen);
            dispatcher.submit(
                Lane::Status,
                Box::new(move || seen.lock().expect("seen").push(n)),
            );
        }
        dispatcher.flush();
        assert_eq!(*seen.lock().expect("seen"), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn stalled_lane_does_not_hold_up_the_others() {
        let dispatcher = EffectDispatcher::new();
        let (release, stalled) = mpsc::channel::<()>();
        let ran = Arc::new(Mutex::new(false));

        let started = Instant::now();
        dispatcher.submit(
            Lane::Status,
            Box::new(move || {
                let _ = stalled.recv_timeout(Duration::from_secs(5));
            }),
        );
        let flag = Arc::clone(&ran);
        dispatcher.submit(
            Lane::Notice,
            Box::new(move || *flag.lock().expect("ran") = true),
        );
        assert!(started.elapsed() < Duration::from_secs(1));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !*ran.lock().expect("ran") && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(*ran.lock().expect("ran"));

        release.send(()).expect("release status lane");
        dispatcher.flush();
    }
}
