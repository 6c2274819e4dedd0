//! Immediate delivery after a save commits.

use std::sync::Arc;
use std::thread;

use chrono::Utc;
use tracing::{debug, error};

use crate::engine::Shared;
use crate::error::StoreError;
use crate::outbox::{PendingDelivery, SaveId};
use crate::store::Store;

/// Try to deliver a freshly committed save right away.
///
/// Delivery happens on its own thread, which holds the dispatch gate until
/// it finishes. When the gate is taken, or an older save is still waiting,
/// the save is left for the queue processor and marked ready instead.
/// Never fails: the save is already durable in the outbox.
pub(crate) fn dispatch_immediately<St: Store>(shared: &Arc<Shared<St>>, pending: PendingDelivery) {
    let PendingDelivery { id, payload } = pending;
    let mut worker = None;

    if let Some(guard) = shared.dispatch_gate.try_acquire() {
        match shared.store.outbox_oldest_pending() {
            Ok(Some(oldest)) if oldest != id => {
                debug!(save_id = %id, %oldest, "Older outbox messages are waiting, queueing");
            }
            Ok(_) => {
                let dispatcher = shared.dispatcher();
                let spawned = thread::Builder::new()
                    .name("salus-dispatch".to_string())
                    .spawn(move || {
                        let _guard = guard;
                        dispatcher.dispatch_by_id(id, &payload)
                    });
                match spawned {
                    Ok(handle) => worker = Some(handle),
                    Err(err) => error!(save_id = %id, error = %err, "Error starting dispatch thread"),
                }
            }
            Err(err) => {
                error!(save_id = %id, error = %err, "Error reading outbox queue before sending");
            }
        }
    } else {
        debug!(save_id = %id, "Dispatch gate is held, queueing");
    }

    match worker {
        Some(handle) => {
            if shared.options.do_not_fire_and_forget() && handle.join().is_err() {
                error!(save_id = %id, "Dispatch thread panicked");
            }
        }
        None => mark_ready(&shared.store, id),
    }
}

fn mark_ready<St: Store>(store: &St, id: SaveId) {
    match store.outbox_mark_ready(id, Utc::now()) {
        Ok(()) => {}
        // Delivered by the queue processor in the meantime.
        Err(StoreError::OutboxCompleted(_)) => {}
        Err(err) => error!(save_id = %id, error = %err, "Error marking outbox message ready"),
    }
}
