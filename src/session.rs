use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, trace};

use crate::capture::{ChangeCapture, WriteMode};
use crate::coordinator;
use crate::engine::Shared;
use crate::error::{SalusError, SalusResult};
use crate::outbox::{self, PendingDelivery};
use crate::record::{self, Fields, IntoKey, Record, RowKey};
use crate::store::{InMemoryStore, Store, Write, WriteBatch};
use crate::tracker::{ChangeTracker, DirtyRecord, RecordState};

#[derive(Debug, Default)]
struct TransactionBuffer {
    staged: WriteBatch,
    deliveries: Vec<PendingDelivery>,
}

/// A unit of work over the store.
///
/// Record changes are tracked until [`save_changes`](Self::save_changes),
/// which commits them together with the outbox row describing them. Inside a
/// [`transaction`](Self::transaction) commits are staged until the
/// transaction commits, and only then are the saves dispatched.
pub struct Session<St: Store = InMemoryStore> {
    shared: Arc<Shared<St>>,
    tracker: ChangeTracker,
    mode: WriteMode,
    transaction: Option<TransactionBuffer>,
}

impl<St: Store> Session<St> {
    pub(crate) fn new(shared: Arc<Shared<St>>, mode: WriteMode) -> Self {
        Self {
            shared,
            tracker: ChangeTracker::new(),
            mode,
            transaction: None,
        }
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn has_changes(&self) -> bool {
        self.tracker.has_changes()
    }

    /// Load a record by key. Sees unsaved changes of this session.
    pub fn get<M: Record>(&self, key: impl IntoKey) -> SalusResult<Option<M>> {
        let key = RowKey::new(M::COLLECTION, key);
        self.current_row(&key)?
            .map(record::from_fields::<M>)
            .transpose()
    }

    /// All records of `M` matching `predicate`, ordered by key.
    pub fn find<M: Record>(&self, predicate: impl Fn(&M) -> bool) -> SalusResult<Vec<M>> {
        let mut rows: BTreeMap<RowKey, Fields> =
            self.shared.store.rows(M::COLLECTION)?.into_iter().collect();

        if let Some(tx) = &self.transaction {
            for write in tx.staged.iter() {
                match write {
                    Write::Insert { key, fields } | Write::Update { key, fields }
                        if key.collection == M::COLLECTION =>
                    {
                        rows.insert(key.clone(), fields.clone());
                    }
                    Write::Delete { key } if key.collection == M::COLLECTION => {
                        rows.remove(key);
                    }
                    _ => {}
                }
            }
        }

        for dirty in self.tracker.dirty_records() {
            if dirty.collection() != M::COLLECTION {
                continue;
            }
            match dirty.current {
                Some(fields) => rows.insert(dirty.key, fields),
                None => rows.remove(&dirty.key),
            };
        }

        let mut found = Vec::new();
        for fields in rows.into_values() {
            let record = record::from_fields::<M>(fields)?;
            if predicate(&record) {
                found.push(record);
            }
        }
        Ok(found)
    }

    /// Track a new record. Fails if a row with its key already exists.
    pub fn add<M: Record>(&mut self, record: &M) -> SalusResult<()> {
        let fields = record::to_fields(record)?;
        let key = RowKey::of::<M>(&fields)?;
        self.add_fields(key, M::KEY_FIELDS, fields)
    }

    /// Track new values for an existing record.
    pub fn update<M: Record>(&mut self, record: &M) -> SalusResult<()> {
        let fields = record::to_fields(record)?;
        let key = RowKey::of::<M>(&fields)?;
        self.update_fields(key, M::KEY_FIELDS, fields)
    }

    /// Track the deletion of an existing record.
    pub fn remove<M: Record>(&mut self, record: &M) -> SalusResult<()> {
        let fields = record::to_fields(record)?;
        let key = RowKey::of::<M>(&fields)?;
        self.remove_key(key, M::KEY_FIELDS)
    }

    pub fn remove_by_key<M: Record>(&mut self, key: impl IntoKey) -> SalusResult<()> {
        self.remove_key(RowKey::new(M::COLLECTION, key), M::KEY_FIELDS)
    }

    pub(crate) fn add_fields(
        &mut self,
        key: RowKey,
        key_fields: &'static [&'static str],
        fields: Fields,
    ) -> SalusResult<()> {
        if self.current_row(&key)?.is_some() {
            return Err(SalusError::AlreadyExists(key.to_string()));
        }
        self.tracker.added(key, key_fields, fields);
        Ok(())
    }

    pub(crate) fn update_fields(
        &mut self,
        key: RowKey,
        key_fields: &'static [&'static str],
        fields: Fields,
    ) -> SalusResult<()> {
        let original = self
            .current_row(&key)?
            .ok_or_else(|| SalusError::NotFound(key.to_string()))?;
        self.tracker.modified(key, key_fields, original, fields);
        Ok(())
    }

    pub(crate) fn remove_key(
        &mut self,
        key: RowKey,
        key_fields: &'static [&'static str],
    ) -> SalusResult<()> {
        let original = self
            .current_row(&key)?
            .ok_or_else(|| SalusError::NotFound(key.to_string()))?;
        self.tracker.deleted(key, key_fields, original);
        Ok(())
    }

    /// A row as this session sees it: tracked changes first, then writes
    /// staged by the open transaction, then the store.
    pub(crate) fn current_row(&self, key: &RowKey) -> SalusResult<Option<Fields>> {
        if let Some(tracked) = self.tracker.current(key) {
            return Ok(tracked.cloned());
        }
        if let Some(tx) = &self.transaction {
            if let Some(staged) = tx.staged.staged_row(key) {
                return Ok(staged.cloned());
            }
        }
        Ok(self.shared.store.get_row(key)?)
    }

    /// Persist tracked changes, and their outbox row when any tracked record
    /// type changed. Returns the number of rows written.
    pub fn save_changes(&mut self) -> SalusResult<usize> {
        let dirty = self.tracker.dirty_records();
        if dirty.is_empty() {
            return Ok(0);
        }

        let capture = ChangeCapture::new(&self.shared.sources, self.shared.options.schema_version());
        let save = capture.capture(&dirty, self.mode)?;

        let mut batch = data_writes(dirty);
        let written = batch.len();
        let delivery = match save {
            Some(mut save) => Some(outbox::record_pending(
                &self.shared.store,
                &mut batch,
                &mut save,
                Utc::now(),
            )?),
            None => None,
        };

        match self.transaction.as_mut() {
            Some(tx) => {
                trace!(rows = written, "Staging changes in transaction");
                tx.staged.extend(batch);
                tx.deliveries.extend(delivery);
            }
            None => {
                self.shared.store.commit(batch)?;
                if let Some(delivery) = delivery {
                    coordinator::dispatch_immediately(&self.shared, delivery);
                }
            }
        }

        self.tracker.clear();
        Ok(written)
    }

    /// Open a transaction. Dropping it without committing rolls it back.
    pub fn transaction(&mut self) -> SalusResult<Transaction<'_, St>> {
        if self.transaction.is_some() {
            return Err(SalusError::TransactionInProgress);
        }
        debug!("Beginning transaction");
        self.transaction = Some(TransactionBuffer::default());
        Ok(Transaction {
            session: self,
            finished: false,
        })
    }

    fn commit_transaction(&mut self) -> SalusResult<()> {
        let Some(tx) = self.transaction.take() else {
            return Ok(());
        };

        self.shared.store.commit(tx.staged)?;
        debug!(saves = tx.deliveries.len(), "Committed transaction");

        for delivery in tx.deliveries {
            coordinator::dispatch_immediately(&self.shared, delivery);
        }
        Ok(())
    }

    fn rollback_transaction(&mut self) {
        if let Some(tx) = self.transaction.take() {
            debug!(saves = tx.deliveries.len(), "Rolled back transaction");
        }
        self.tracker.clear();
    }
}

fn data_writes(dirty: Vec<DirtyRecord>) -> WriteBatch {
    let mut batch = WriteBatch::new();
    for record in dirty {
        let write = match (record.state, record.current) {
            (RecordState::Added, Some(fields)) => Write::Insert {
                key: record.key,
                fields,
            },
            (RecordState::Modified, Some(fields)) => Write::Update {
                key: record.key,
                fields,
            },
            _ => Write::Delete { key: record.key },
        };
        batch.push(write);
    }
    batch
}

/// An open transaction on a [`Session`].
///
/// Derefs to the session for tracking and saving. Saves made inside it are
/// neither visible to other sessions nor dispatched until
/// [`commit`](Self::commit).
pub struct Transaction<'s, St: Store> {
    session: &'s mut Session<St>,
    finished: bool,
}

impl<St: Store> Transaction<'_, St> {
    pub fn commit(mut self) -> SalusResult<()> {
        self.finished = true;
        self.session.commit_transaction()
    }

    pub fn rollback(mut self) {
        self.finished = true;
        self.session.rollback_transaction();
    }
}

impl<St: Store> Deref for Transaction<'_, St> {
    type Target = Session<St>;

    fn deref(&self) -> &Session<St> {
        &*self.session
    }
}

impl<St: Store> DerefMut for Transaction<'_, St> {
    fn deref_mut(&mut self) -> &mut Session<St> {
        &mut *self.session
    }
}

impl<St: Store> Drop for Transaction<'_, St> {
    fn drop(&mut self) {
        if !self.finished {
            self.session.rollback_transaction();
        }
    }
}
