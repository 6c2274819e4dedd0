//! Outbox rows and the helper that stages one alongside a save's data writes.

mod record;

pub use record::{OutboxRecord, SaveId};

use chrono::{DateTime, Utc};

use crate::change::Save;
use crate::error::SalusResult;
use crate::store::{Store, Write, WriteBatch};

/// A recorded save waiting for its first dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingDelivery {
    pub id: SaveId,
    pub payload: String,
}

/// Assign the save its id and stage its outbox row into `batch`.
///
/// The row commits or rolls back with the rest of the batch.
pub(crate) fn record_pending<St: Store>(
    store: &St,
    batch: &mut WriteBatch,
    save: &mut Save,
    now: DateTime<Utc>,
) -> SalusResult<PendingDelivery> {
    let id = store.next_save_id()?;
    save.assign_id(id);
    let payload = save.to_json()?;

    batch.push(Write::InsertOutbox(OutboxRecord::pending(
        id,
        payload.clone(),
        now,
    )));

    Ok(PendingDelivery { id, payload })
}
