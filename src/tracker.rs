use crate::record::{Fields, RowKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Added,
    Modified,
    Deleted,
}

/// A pending row change as handed to change capture.
///
/// `current` is `None` for deletes, `original` is `None` for inserts.
#[derive(Debug, Clone, PartialEq)]
pub struct DirtyRecord {
    pub key: RowKey,
    pub key_fields: &'static [&'static str],
    pub state: RecordState,
    pub current: Option<Fields>,
    pub original: Option<Fields>,
}

impl DirtyRecord {
    pub fn collection(&self) -> &str {
        &self.key.collection
    }

    fn has_changes(&self) -> bool {
        match self.state {
            RecordState::Modified => self.current != self.original,
            RecordState::Added | RecordState::Deleted => true,
        }
    }
}

/// Unsaved row changes of one session, folded per row in first-touch order.
///
/// Adding then removing a row cancels out. Removing then re-adding one
/// becomes an update against the stored original.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    entries: Vec<DirtyRecord>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &RowKey) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.key == key)
    }

    pub fn state(&self, key: &RowKey) -> Option<RecordState> {
        self.position(key).map(|i| self.entries[i].state)
    }

    /// Tracked view of a row: `Some(None)` when tracked as deleted,
    /// `None` when not tracked.
    pub fn current(&self, key: &RowKey) -> Option<Option<&Fields>> {
        self.position(key).map(|i| self.entries[i].current.as_ref())
    }

    pub fn added(&mut self, key: RowKey, key_fields: &'static [&'static str], fields: Fields) {
        match self.position(&key) {
            Some(i) => {
                let entry = &mut self.entries[i];
                if entry.state == RecordState::Deleted {
                    entry.state = RecordState::Modified;
                }
                entry.current = Some(fields);
            }
            None => self.entries.push(DirtyRecord {
                key,
                key_fields,
                state: RecordState::Added,
                current: Some(fields),
                original: None,
            }),
        }
    }

    /// `original` is only read when the row is not tracked yet.
    pub fn modified(
        &mut self,
        key: RowKey,
        key_fields: &'static [&'static str],
        original: Fields,
        fields: Fields,
    ) {
        match self.position(&key) {
            Some(i) => {
                let entry = &mut self.entries[i];
                if entry.state == RecordState::Deleted {
                    entry.state = RecordState::Modified;
                }
                entry.current = Some(fields);
            }
            None => self.entries.push(DirtyRecord {
                key,
                key_fields,
                state: RecordState::Modified,
                current: Some(fields),
                original: Some(original),
            }),
        }
    }

    /// `original` is only read when the row is not tracked yet.
    pub fn deleted(&mut self, key: RowKey, key_fields: &'static [&'static str], original: Fields) {
        match self.position(&key) {
            Some(i) if self.entries[i].state == RecordState::Added => {
                self.entries.remove(i);
            }
            Some(i) => {
                let entry = &mut self.entries[i];
                entry.state = RecordState::Deleted;
                entry.current = None;
            }
            None => self.entries.push(DirtyRecord {
                key,
                key_fields,
                state: RecordState::Deleted,
                current: None,
                original: Some(original),
            }),
        }
    }

    /// Rows with an effective change, in first-touch order.
    pub fn dirty_records(&self) -> Vec<DirtyRecord> {
        self.entries
            .iter()
            .filter(|entry| entry.has_changes())
            .cloned()
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.entries.iter().any(DirtyRecord::has_changes)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY: &[&str] = &["id"];

    fn fields(id: i64, name: &str) -> Fields {
        json!({ "id": id, "name": name }).as_object().cloned().unwrap()
    }

    #[test]
    fn add_then_delete_cancels() {
        let mut tracker = ChangeTracker::new();
        let key = RowKey::new("people", 1);

        tracker.added(key.clone(), KEY, fields(1, "Ada"));
        tracker.deleted(key, KEY, fields(1, "Ada"));

        assert!(!tracker.has_changes());
        assert!(tracker.dirty_records().is_empty());
    }

    #[test]
    fn repeated_updates_keep_first_original() {
        let mut tracker = ChangeTracker::new();
        let key = RowKey::new("people", 1);

        tracker.modified(key.clone(), KEY, fields(1, "Ada"), fields(1, "Grace"));
        tracker.modified(key.clone(), KEY, fields(1, "Grace"), fields(1, "Hedy"));

        let dirty = tracker.dirty_records();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].original, Some(fields(1, "Ada")));
        assert_eq!(dirty[0].current, Some(fields(1, "Hedy")));
    }

    #[test]
    fn update_back_to_original_is_not_dirty() {
        let mut tracker = ChangeTracker::new();
        let key = RowKey::new("people", 1);

        tracker.modified(key.clone(), KEY, fields(1, "Ada"), fields(1, "Grace"));
        tracker.modified(key, KEY, fields(1, "Grace"), fields(1, "Ada"));

        assert!(!tracker.has_changes());
    }

    #[test]
    fn delete_then_add_becomes_update() {
        let mut tracker = ChangeTracker::new();
        let key = RowKey::new("people", 1);

        tracker.deleted(key.clone(), KEY, fields(1, "Ada"));
        assert_eq!(tracker.current(&key), Some(None));

        tracker.added(key.clone(), KEY, fields(1, "Grace"));

        assert_eq!(tracker.state(&key), Some(RecordState::Modified));
        assert_eq!(tracker.current(&key), Some(Some(&fields(1, "Grace"))));
    }

    #[test]
    fn update_of_added_stays_added() {
        let mut tracker = ChangeTracker::new();
        let key = RowKey::new("people", 1);

        tracker.added(key.clone(), KEY, fields(1, "Ada"));
        tracker.modified(key.clone(), KEY, fields(1, "Ada"), fields(1, "Grace"));

        let dirty = tracker.dirty_records();
        assert_eq!(dirty[0].state, RecordState::Added);
        assert_eq!(dirty[0].current, Some(fields(1, "Grace")));
        assert_eq!(dirty[0].original, None);
    }

    #[test]
    fn order_is_first_touch() {
        let mut tracker = ChangeTracker::new();
        tracker.added(RowKey::new("people", 2), KEY, fields(2, "B"));
        tracker.added(RowKey::new("people", 1), KEY, fields(1, "A"));
        tracker.modified(RowKey::new("people", 2), KEY, fields(2, "B"), fields(2, "C"));

        let keys: Vec<_> = tracker
            .dirty_records()
            .into_iter()
            .map(|d| d.key.to_string())
            .collect();
        assert_eq!(keys, vec!["people:2", "people:1"]);
    }
}
