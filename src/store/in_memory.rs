use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::{Store, Write, WriteBatch};
use crate::error::StoreError;
use crate::outbox::{OutboxRecord, SaveId};
use crate::record::{Fields, RowKey};

#[derive(Default)]
struct Tables {
    rows: HashMap<RowKey, Fields>,
    outbox: BTreeMap<SaveId, OutboxRecord>,
}

/// Thread-safe in-memory store.
///
/// Clones share the same tables, so a clone can be handed to a worker thread.
#[derive(Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    save_seq: Arc<AtomicU64>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            save_seq: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self, collection: &str) -> Result<usize, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables
            .rows
            .keys()
            .filter(|key| key.collection == collection)
            .count())
    }
}

fn validate(tables: &Tables, batch: &WriteBatch) -> Result<(), StoreError> {
    // Row existence and outbox completion as seen by the writes so far.
    let mut rows: HashMap<&RowKey, bool> = HashMap::new();
    let mut outbox: HashMap<SaveId, bool> = HashMap::new();

    for write in batch.iter() {
        match write {
            Write::Insert { key, .. } => {
                let exists = rows
                    .get(key)
                    .copied()
                    .unwrap_or_else(|| tables.rows.contains_key(key));
                if exists {
                    return Err(StoreError::Conflict(key.to_string()));
                }
                rows.insert(key, true);
            }
            Write::Update { key, .. } | Write::Delete { key } => {
                let exists = rows
                    .get(key)
                    .copied()
                    .unwrap_or_else(|| tables.rows.contains_key(key));
                if !exists {
                    return Err(StoreError::Missing(key.to_string()));
                }
                rows.insert(key, matches!(write, Write::Update { .. }));
            }
            Write::InsertOutbox(record) => {
                if outbox.contains_key(&record.id) || tables.outbox.contains_key(&record.id) {
                    return Err(StoreError::OutboxConflict(record.id));
                }
                outbox.insert(record.id, record.is_completed());
            }
            Write::UpdateOutbox(record) => {
                check_pending(tables, &outbox, record.id)?;
                outbox.insert(record.id, record.is_completed());
            }
            Write::MarkOutboxReady { id, .. } => {
                check_pending(tables, &outbox, *id)?;
            }
        }
    }

    Ok(())
}

fn check_pending(
    tables: &Tables,
    staged: &HashMap<SaveId, bool>,
    id: SaveId,
) -> Result<(), StoreError> {
    let completed = match staged.get(&id) {
        Some(completed) => *completed,
        None => tables
            .outbox
            .get(&id)
            .map(OutboxRecord::is_completed)
            .ok_or(StoreError::OutboxMissing(id))?,
    };
    if completed {
        return Err(StoreError::OutboxCompleted(id));
    }
    Ok(())
}

impl Store for InMemoryStore {
    fn get_row(&self, key: &RowKey) -> Result<Option<Fields>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables.rows.get(key).cloned())
    }

    fn rows(&self, collection: &str) -> Result<Vec<(RowKey, Fields)>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        let mut rows: Vec<_> = tables
            .rows
            .iter()
            .filter(|(key, _)| key.collection == collection)
            .map(|(key, fields)| (key.clone(), fields.clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    fn next_save_id(&self) -> Result<SaveId, StoreError> {
        Ok(SaveId(self.save_seq.fetch_add(1, Ordering::SeqCst)))
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;

        validate(&tables, &batch)?;

        for write in batch.into_writes() {
            match write {
                Write::Insert { key, fields } | Write::Update { key, fields } => {
                    tables.rows.insert(key, fields);
                }
                Write::Delete { key } => {
                    tables.rows.remove(&key);
                }
                Write::InsertOutbox(record) | Write::UpdateOutbox(record) => {
                    tables.outbox.insert(record.id, record);
                }
                Write::MarkOutboxReady { id, at } => {
                    if let Some(record) = tables.outbox.get_mut(&id) {
                        record.mark_ready(at);
                    }
                }
            }
        }

        Ok(())
    }

    fn outbox_get(&self, id: SaveId) -> Result<Option<OutboxRecord>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables.outbox.get(&id).cloned())
    }

    fn outbox_pending(&self) -> Result<Vec<OutboxRecord>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables
            .outbox
            .values()
            .filter(|record| !record.is_completed())
            .cloned()
            .collect())
    }

    fn outbox_oldest_pending(&self) -> Result<Option<SaveId>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables
            .outbox
            .values()
            .find(|record| !record.is_completed())
            .map(|record| record.id))
    }

    fn outbox_all(&self) -> Result<Vec<OutboxRecord>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(tables.outbox.values().cloned().collect())
    }

    fn outbox_purge(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        let before = tables.outbox.len();
        tables
            .outbox
            .retain(|_, record| !matches!(record.completed_at, Some(at) if at < cutoff));
        Ok(before - tables.outbox.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn row(id: i64, name: &str) -> (RowKey, Fields) {
        let fields = json!({ "id": id, "name": name })
            .as_object()
            .cloned()
            .unwrap();
        (RowKey::new("people", id), fields)
    }

    #[test]
    fn save_ids_strictly_increase() {
        let store = InMemoryStore::new();
        let a = store.next_save_id().unwrap();
        let b = store.clone().next_save_id().unwrap();
        assert!(b > a);
    }

    #[test]
    fn commit_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let (key, fields) = row(1, "Ada");

        let mut batch = WriteBatch::new();
        batch.push(Write::Insert {
            key: key.clone(),
            fields: fields.clone(),
        });
        batch.push(Write::InsertOutbox(OutboxRecord::pending(
            SaveId(1),
            "{}".into(),
            Utc::now(),
        )));
        batch.push(Write::Delete {
            key: RowKey::new("people", 99),
        });

        let err = store.commit(batch).unwrap_err();
        assert_eq!(err, StoreError::Missing("people:99".into()));
        assert!(store.get_row(&key).unwrap().is_none());
        assert!(store.outbox_all().unwrap().is_empty());
    }

    #[test]
    fn insert_then_delete_in_one_batch() {
        let store = InMemoryStore::new();
        let (key, fields) = row(1, "Ada");

        let mut batch = WriteBatch::new();
        batch.push(Write::Insert {
            key: key.clone(),
            fields,
        });
        batch.push(Write::Delete { key: key.clone() });
        store.commit(batch).unwrap();

        assert!(store.get_row(&key).unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_conflicts() {
        let store = InMemoryStore::new();
        let (key, fields) = row(1, "Ada");

        let mut batch = WriteBatch::new();
        batch.push(Write::Insert {
            key: key.clone(),
            fields: fields.clone(),
        });
        store.commit(batch.clone()).unwrap();

        assert_eq!(
            store.commit(batch).unwrap_err(),
            StoreError::Conflict("people:1".into())
        );
    }

    #[test]
    fn completed_outbox_records_are_frozen() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut record = OutboxRecord::pending(store.next_save_id().unwrap(), "{}".into(), now);

        let mut batch = WriteBatch::new();
        batch.push(Write::InsertOutbox(record.clone()));
        store.commit(batch).unwrap();

        record.complete(now);
        store.outbox_update(record.clone()).unwrap();

        record.completed_at = None;
        assert_eq!(
            store.outbox_update(record.clone()).unwrap_err(),
            StoreError::OutboxCompleted(record.id)
        );
    }

    #[test]
    fn mark_ready_only_touches_next_attempt() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut record = OutboxRecord::pending(store.next_save_id().unwrap(), "{}".into(), now);

        let mut batch = WriteBatch::new();
        batch.push(Write::InsertOutbox(record.clone()));
        store.commit(batch).unwrap();

        record.fail(now, now + Duration::seconds(30));
        store.outbox_update(record.clone()).unwrap();

        let ready_at = now + Duration::seconds(1);
        store.outbox_mark_ready(record.id, ready_at).unwrap();

        let stored = store.outbox_get(record.id).unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 1);
        assert_eq!(stored.last_failed_at, Some(now));
        assert_eq!(stored.next_attempt_at, Some(ready_at));

        record.complete(now);
        store.outbox_update(record.clone()).unwrap();
        assert_eq!(
            store.outbox_mark_ready(record.id, ready_at).unwrap_err(),
            StoreError::OutboxCompleted(record.id)
        );
        assert_eq!(
            store.outbox_mark_ready(SaveId(99), ready_at).unwrap_err(),
            StoreError::OutboxMissing(SaveId(99))
        );
    }

    #[test]
    fn pending_is_ordered_and_excludes_completed() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut batch = WriteBatch::new();
        for _ in 0..3 {
            let id = store.next_save_id().unwrap();
            batch.push(Write::InsertOutbox(OutboxRecord::pending(id, "{}".into(), now)));
        }
        store.commit(batch).unwrap();

        let mut first = store.outbox_get(SaveId(1)).unwrap().unwrap();
        first.complete(now);
        store.outbox_update(first).unwrap();

        let pending: Vec<_> = store
            .outbox_pending()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(pending, vec![SaveId(2), SaveId(3)]);
        assert_eq!(store.outbox_oldest_pending().unwrap(), Some(SaveId(2)));
    }

    #[test]
    fn purge_only_removes_completed_before_cutoff() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut batch = WriteBatch::new();

        let mut old = OutboxRecord::pending(SaveId(1), "{}".into(), now - Duration::hours(2));
        old.complete(now - Duration::hours(1));
        let mut recent = OutboxRecord::pending(SaveId(2), "{}".into(), now);
        recent.complete(now);
        let pending = OutboxRecord::pending(SaveId(3), "{}".into(), now - Duration::days(3));

        batch.push(Write::InsertOutbox(old));
        batch.push(Write::InsertOutbox(recent));
        batch.push(Write::InsertOutbox(pending));
        store.commit(batch).unwrap();

        let purged = store.outbox_purge(now - Duration::minutes(30)).unwrap();
        assert_eq!(purged, 1);

        let ids: Vec<_> = store.outbox_all().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![SaveId(2), SaveId(3)]);
    }
}
