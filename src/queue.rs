use std::io;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::dispatch::Dispatcher;
use crate::error::StoreError;
use crate::gate::DispatchGate;
use crate::store::Store;
use crate::worker::PeriodicWorker;

/// Outcome of one queue pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainResult {
    /// The dispatch gate was held elsewhere, nothing was attempted.
    pub skipped: bool,
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub passes: usize,
    pub skipped_passes: usize,
    pub messages_sent: usize,
    pub messages_failed: usize,
    pub errors: usize,
}

impl QueueStats {
    fn record(&mut self, result: &DrainResult) {
        self.passes += 1;
        if result.skipped {
            self.skipped_passes += 1;
        }
        self.messages_sent += result.completed;
        self.messages_failed += result.failed;
    }
}

/// Retries undelivered outbox rows in id order.
///
/// A pass stops at the first row that is not yet due or fails again, so a
/// later save is never delivered ahead of an earlier one.
#[derive(Clone)]
pub struct QueueProcessor<St> {
    dispatcher: Dispatcher<St>,
    gate: DispatchGate,
}

impl<St: Store> QueueProcessor<St> {
    pub fn new(dispatcher: Dispatcher<St>, gate: DispatchGate) -> Self {
        Self { dispatcher, gate }
    }

    pub fn process_queue(&self) -> Result<DrainResult, StoreError> {
        let Some(_guard) = self.gate.try_acquire() else {
            debug!("Skipping queue processing, dispatch gate is held");
            return Ok(DrainResult {
                skipped: true,
                ..DrainResult::default()
            });
        };

        let now = Utc::now();
        let queue = self.dispatcher.store().outbox_pending()?;
        debug!(pending = queue.len(), "Processing outbox queue");

        let mut result = DrainResult::default();
        for mut record in queue {
            if !record.is_due(now) {
                debug!(save_id = %record.id, next_attempt_at = ?record.next_attempt_at, "Oldest pending message is not due yet");
                break;
            }

            result.attempted += 1;
            let payload = record.payload.clone();
            if self.dispatcher.attempt_send(&payload, Some(&mut record)) {
                result.completed += 1;
            } else {
                result.failed += 1;
                info!(save_id = %record.id, "Stopping queue processing to keep messages in order");
                break;
            }
        }

        Ok(result)
    }

    /// Run [`process_queue`](Self::process_queue) on a background thread.
    pub fn spawn(self, interval: Duration) -> io::Result<PeriodicWorker<QueueStats>> {
        PeriodicWorker::spawn("salus-queue", interval, move |stats: &mut QueueStats| {
            match self.process_queue() {
                Ok(result) => stats.record(&result),
                Err(err) => {
                    stats.errors += 1;
                    error!(error = %err, "Error processing outbox queue");
                }
            }
        })
    }
}
