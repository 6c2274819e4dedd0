//! Storage seam.
//!
//! A [`Store`] holds the tracked rows and the outbox table and commits a
//! [`WriteBatch`] atomically: every write lands or none does. That is what
//! ties a save's data changes to its outbox row.

mod in_memory;

pub use in_memory::InMemoryStore;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::outbox::{OutboxRecord, SaveId};
use crate::record::{Fields, RowKey};

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Insert { key: RowKey, fields: Fields },
    Update { key: RowKey, fields: Fields },
    Delete { key: RowKey },
    InsertOutbox(OutboxRecord),
    UpdateOutbox(OutboxRecord),
    /// Set only `next_attempt_at` on a pending outbox record.
    MarkOutboxReady { id: SaveId, at: DateTime<Utc> },
}

/// Ordered writes committed as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    pub fn extend(&mut self, other: WriteBatch) {
        self.writes.extend(other.writes);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Write> {
        self.writes.iter()
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }

    /// Latest staged state of a row: `Some(Some(_))` written, `Some(None)`
    /// deleted, `None` when the batch does not touch it.
    pub fn staged_row(&self, key: &RowKey) -> Option<Option<&Fields>> {
        self.writes.iter().rev().find_map(|write| match write {
            Write::Insert { key: k, fields } | Write::Update { key: k, fields } if k == key => {
                Some(Some(fields))
            }
            Write::Delete { key: k } if k == key => Some(None),
            _ => None,
        })
    }
}

pub trait Store: Clone + Send + Sync + 'static {
    fn get_row(&self, key: &RowKey) -> Result<Option<Fields>, StoreError>;

    /// All rows of a collection, ordered by key.
    fn rows(&self, collection: &str) -> Result<Vec<(RowKey, Fields)>, StoreError>;

    /// Reserve the next save id. Ids are never reused, even when the batch
    /// that would have carried them is rolled back.
    fn next_save_id(&self) -> Result<SaveId, StoreError>;

    /// Apply every write or none.
    ///
    /// Inserting an existing row, updating or deleting a missing one, and
    /// updating a completed outbox record are all rejected.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    fn outbox_get(&self, id: SaveId) -> Result<Option<OutboxRecord>, StoreError>;

    /// Undelivered records in ascending id order.
    fn outbox_pending(&self) -> Result<Vec<OutboxRecord>, StoreError>;

    fn outbox_all(&self) -> Result<Vec<OutboxRecord>, StoreError>;

    /// Delete completed records whose completion precedes `cutoff`.
    fn outbox_purge(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    fn outbox_oldest_pending(&self) -> Result<Option<SaveId>, StoreError> {
        Ok(self.outbox_pending()?.first().map(|record| record.id))
    }

    fn outbox_update(&self, record: OutboxRecord) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.push(Write::UpdateOutbox(record));
        self.commit(batch)
    }

    /// Make a pending record due at `at`, leaving its failure history alone.
    fn outbox_mark_ready(&self, id: SaveId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.push(Write::MarkOutboxReady { id, at });
        self.commit(batch)
    }
}
