use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{PresenceError, Result};

/// Named background thread that runs `work` after each wait until stopped.
pub(crate) struct PeriodicWorker {
    name: String,
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl PeriodicWorker {
    /// `next_wait` is consulted before every sleep, so the interval can track
    /// the nearest deadline.
    pub(crate) fn spawn<W, F>(name: &str, mut next_wait: W, mut work: F) -> Result<Self>
    where
        W: FnMut() -> Duration + Send + 'static,
        F: FnMut() + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(next_wait()) {
                    Err(RecvTimeoutError::Timeout) => work(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|source| PresenceError::WorkerSpawn {
                name: name.to_string(),
                source,
            })?;

        tracing::debug!(worker = name, "Worker started");
        Ok(Self {
            name: name.to_string(),
            stop,
            handle,
        })
    }

    /// Signals the worker and waits for it, unless called from the worker itself.
    pub(crate) fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        if self.handle.join().is_err() {
            tracing::warn!(worker = %self.name, "Worker panicked before shutdown");
        } else {
            tracing::debug!(worker = %self.name, "Worker stopped");
        }
    }
}
