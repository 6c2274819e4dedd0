//! Background threads that run a task on a fixed interval.
//!
//! The queue processor and the purger each run on one of these. A worker
//! ticks once immediately, then once per interval until it is stopped, and
//! hands back the statistics it accumulated.

use std::io;
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error};

/// A named thread calling `tick` every `interval`.
///
/// Dropping the worker signals it to stop without waiting for it.
pub struct PeriodicWorker<S> {
    name: String,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<S>>,
}

impl<S: Default + Send + 'static> PeriodicWorker<S> {
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut(&mut S) + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(worker = %thread_name, ?interval, "Worker started");
                let mut stats = S::default();

                loop {
                    tick(&mut stats);

                    match stop_rx.recv_timeout(interval) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                }

                debug!(worker = %thread_name, "Worker stopped");
                stats
            })?;

        Ok(Self {
            name: name.to_string(),
            stop_tx,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the worker to stop after its current tick.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }

    /// Stop the worker and wait for it, returning its statistics.
    pub fn stop(mut self) -> S {
        self.signal_stop();
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                error!(worker = %self.name, "Worker thread panicked");
                S::default()
            }
            None => S::default(),
        }
    }
}

impl<S> Drop for PeriodicWorker<S> {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
