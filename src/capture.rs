//! Field-level change capture.
//!
//! Turns a session's dirty records into a single [`Save`], restricted to
//! the record types registered as sources.

use std::collections::HashMap;

use tracing::trace;

use crate::change::{Change, Field, Save};
use crate::error::{CaptureError, ConfigError};
use crate::record::{Fields, Record};
use crate::tracker::{DirtyRecord, RecordState};

/// Whether a session's writes produce outbox rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Capture,
    /// Writes made while applying replicated changes. Never captured.
    Replay,
}

#[derive(Debug, Clone)]
struct SourceMapping {
    tag: String,
}

/// Record types whose changes are captured, by collection.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    by_collection: HashMap<String, SourceMapping>,
}

impl SourceRegistry {
    pub fn register<M: Record>(&mut self, tag: &str) -> Result<(), ConfigError> {
        if M::KEY_FIELDS.is_empty() {
            return Err(ConfigError::NoKey {
                collection: M::COLLECTION.to_string(),
            });
        }
        if self.by_collection.contains_key(M::COLLECTION) {
            return Err(ConfigError::DuplicateCollection {
                collection: M::COLLECTION.to_string(),
            });
        }
        if self.by_collection.values().any(|m| m.tag == tag) {
            return Err(ConfigError::DuplicateTag {
                tag: tag.to_string(),
            });
        }

        self.by_collection.insert(
            M::COLLECTION.to_string(),
            SourceMapping {
                tag: tag.to_string(),
            },
        );
        Ok(())
    }

    pub fn tag_for(&self, collection: &str) -> Option<&str> {
        self.by_collection.get(collection).map(|m| m.tag.as_str())
    }

    pub fn is_tracked(&self, collection: &str) -> bool {
        self.by_collection.contains_key(collection)
    }

    pub fn len(&self) -> usize {
        self.by_collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_collection.is_empty()
    }
}

pub struct ChangeCapture<'a> {
    sources: &'a SourceRegistry,
    schema_version: &'a str,
}

impl<'a> ChangeCapture<'a> {
    pub fn new(sources: &'a SourceRegistry, schema_version: &'a str) -> Self {
        Self {
            sources,
            schema_version,
        }
    }

    /// Build the save for a batch of dirty records.
    ///
    /// Returns `None` in replay mode, or when no tracked record type changed.
    pub fn capture(
        &self,
        dirty: &[DirtyRecord],
        mode: WriteMode,
    ) -> Result<Option<Save>, CaptureError> {
        if mode == WriteMode::Replay {
            trace!(records = dirty.len(), "replay write, skipping capture");
            return Ok(None);
        }

        let mut changes = Vec::new();
        for record in dirty {
            let Some(tag) = self.sources.tag_for(record.collection()) else {
                continue;
            };

            let change = match record.state {
                RecordState::Added => {
                    let current = values(record, record.current.as_ref())?;
                    Change::insert(
                        tag,
                        to_field_list(current.iter()),
                        key_fields(record, current)?,
                    )
                }
                RecordState::Modified => {
                    let current = values(record, record.current.as_ref())?;
                    let original = values(record, record.original.as_ref())?;
                    let changed = current
                        .iter()
                        .filter(|(name, value)| original.get(name.as_str()) != Some(*value));
                    Change::update(tag, to_field_list(changed), key_fields(record, original)?)
                }
                RecordState::Deleted => {
                    let original = values(record, record.original.as_ref())?;
                    Change::delete(tag, key_fields(record, original)?)
                }
            };
            changes.push(change);
        }

        let save = Save::new(self.schema_version, changes);
        if let Some(save) = &save {
            trace!(changes = save.changes().len(), "captured save");
        }
        Ok(save)
    }
}

fn values<'r>(record: &DirtyRecord, fields: Option<&'r Fields>) -> Result<&'r Fields, CaptureError> {
    fields.ok_or_else(|| CaptureError::MissingValues {
        collection: record.collection().to_string(),
    })
}

fn to_field_list<'f>(fields: impl Iterator<Item = (&'f String, &'f serde_json::Value)>) -> Vec<Field> {
    fields
        .map(|(name, value)| Field::new(name.clone(), value.clone()))
        .collect()
}

fn key_fields(record: &DirtyRecord, fields: &Fields) -> Result<Vec<Field>, CaptureError> {
    record
        .key_fields
        .iter()
        .map(|name| {
            fields
                .get(*name)
                .map(|value| Field::new(*name, value.clone()))
                .ok_or_else(|| CaptureError::MissingKeyField {
                    collection: record.collection().to_string(),
                    field: name.to_string(),
                })
        })
        .collect()
}
