use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::config::SalusOptions;
use crate::error::SendError;
use crate::outbox::{OutboxRecord, SaveId};
use crate::sender::MessageSender;
use crate::store::Store;

const ERROR_SENDING: &str = "Error sending outbox message";
const ERROR_SAVING_SUCCESS: &str = "Error recording successful delivery of outbox message";
const ERROR_SAVING_FAILURE: &str = "Error recording failed delivery of outbox message";

/// Log level of a delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Sends one message and records the outcome on its outbox row.
#[derive(Clone)]
pub struct Dispatcher<St> {
    store: St,
    sender: Arc<dyn MessageSender>,
    options: Arc<SalusOptions>,
}

impl<St: Store> Dispatcher<St> {
    pub fn new(store: St, sender: Arc<dyn MessageSender>, options: Arc<SalusOptions>) -> Self {
        Self {
            store,
            sender,
            options,
        }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Send `payload`, then record the outcome on `record` when given.
    ///
    /// Returns whether the transport accepted the message. A failure to
    /// persist the outcome is logged and does not change the result, so a
    /// delivered message can be sent again.
    pub fn attempt_send(&self, payload: &str, record: Option<&mut OutboxRecord>) -> bool {
        let save_id = record.as_ref().map(|r| r.id);

        match self.sender.send(payload) {
            Ok(()) => {
                debug!(save_id = ?save_id, "Outbox message sent");
                if let Some(record) = record {
                    record.complete(Utc::now());
                    if let Err(err) = self.store.outbox_update(record.clone()) {
                        error!(save_id = %record.id, error = %err, "{}", ERROR_SAVING_SUCCESS);
                    }
                }
                true
            }
            Err(err) => {
                match record {
                    Some(record) => self.record_failure(record, &err),
                    None => warn!(error = %err, "{}", ERROR_SENDING),
                }
                false
            }
        }
    }

    fn record_failure(&self, record: &mut OutboxRecord, err: &SendError) {
        let now = Utc::now();
        let next_attempt_at = self
            .options
            .retry_strategy()
            .next_attempt_at(record.failed_attempts, now);
        record.fail(now, next_attempt_at);

        match self.failure_severity(record, now) {
            Severity::Warning => warn!(
                save_id = %record.id,
                failed_attempts = record.failed_attempts,
                next_attempt_at = %next_attempt_at,
                error = %err,
                "{}", ERROR_SENDING
            ),
            Severity::Error => error!(
                save_id = %record.id,
                failed_attempts = record.failed_attempts,
                next_attempt_at = %next_attempt_at,
                error = %err,
                "{}", ERROR_SENDING
            ),
        }

        if let Err(err) = self.store.outbox_update(record.clone()) {
            error!(save_id = %record.id, error = %err, "{}", ERROR_SAVING_FAILURE);
        }
    }

    /// Escalate to error once the record has failed `error_after_retries`
    /// times or has been pending for `error_after_elapsed`.
    pub fn failure_severity(&self, record: &OutboxRecord, now: DateTime<Utc>) -> Severity {
        let too_many = self
            .options
            .error_after_retries()
            .is_some_and(|limit| record.failed_attempts >= limit);
        let too_old = self.options.error_after_elapsed().is_some_and(|limit| {
            (now - record.created_at)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= limit)
        });

        if too_many || too_old {
            Severity::Error
        } else {
            Severity::Warning
        }
    }

    /// Deliver the outbox row `id`, reloading it first.
    ///
    /// A row that is already completed is left alone. If the row cannot be
    /// loaded the payload is still sent, without recording the outcome.
    pub fn dispatch_by_id(&self, id: SaveId, payload: &str) -> bool {
        match self.store.outbox_get(id) {
            Ok(Some(record)) if record.is_completed() => {
                debug!(save_id = %id, "Outbox message already delivered");
                true
            }
            Ok(Some(mut record)) => {
                let payload = record.payload.clone();
                self.attempt_send(&payload, Some(&mut record))
            }
            Ok(None) => {
                warn!(save_id = %id, "Outbox record not found; sending without tracking");
                self.attempt_send(payload, None)
            }
            Err(err) => {
                error!(save_id = %id, error = %err, "Error loading outbox record before sending");
                self.attempt_send(payload, None)
            }
        }
    }
}
