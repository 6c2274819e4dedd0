//! Consumer side: applying received saves to local rows.
//!
//! Application is idempotent. Inserting a row that already exists, updating
//! or deleting one that does not, and changes for unregistered entity types
//! are all skipped, so redelivered messages are harmless. Writes are made in
//! replay mode and never produce outbox rows of their own.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::Error as _;
use serde_json::Value;
use tracing::{debug, warn};

use crate::capture::WriteMode;
use crate::change::{ChangeKind, Field, Save};
use crate::engine::Shared;
use crate::error::{ConfigError, SalusResult};
use crate::record::{Fields, KeyKind, Record, RowKey};
use crate::session::Session;
use crate::store::Store;

/// What applying one save did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

impl ApplyReport {
    pub fn applied(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

type FieldsFn = fn(Fields) -> Result<Fields, serde_json::Error>;

#[derive(Clone)]
struct DestinationMapping {
    collection: &'static str,
    key_fields: &'static [&'static str],
    key_kinds: &'static [KeyKind],
    blank: fn() -> Result<Fields, serde_json::Error>,
    normalize: FieldsFn,
}

/// Local record types that received changes are applied to, by entity type tag.
#[derive(Clone, Default)]
pub struct DestinationRegistry {
    by_tag: HashMap<String, DestinationMapping>,
}

impl DestinationRegistry {
    pub fn register<M: Record + Default>(&mut self, tag: &str) -> Result<(), ConfigError> {
        if M::KEY_FIELDS.is_empty() {
            return Err(ConfigError::NoKey {
                collection: M::COLLECTION.to_string(),
            });
        }
        if self.by_tag.contains_key(tag) {
            return Err(ConfigError::DuplicateTag {
                tag: tag.to_string(),
            });
        }

        self.by_tag.insert(
            tag.to_string(),
            DestinationMapping {
                collection: M::COLLECTION,
                key_fields: M::KEY_FIELDS,
                key_kinds: M::KEY_KINDS,
                blank: blank::<M>,
                normalize: normalize::<M>,
            },
        );
        Ok(())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    fn get(&self, tag: &str) -> Option<&DestinationMapping> {
        self.by_tag.get(tag)
    }
}

fn object(value: Value) -> Result<Fields, serde_json::Error> {
    match value {
        Value::Object(fields) => Ok(fields),
        _ => Err(serde_json::Error::custom("record did not serialize to an object")),
    }
}

fn blank<M: Record + Default>() -> Result<Fields, serde_json::Error> {
    object(serde_json::to_value(M::default())?)
}

/// Round-trip through `M` so stored rows always have `M`'s shape.
fn normalize<M: Record>(fields: Fields) -> Result<Fields, serde_json::Error> {
    let record: M = serde_json::from_value(Value::Object(fields))?;
    object(serde_json::to_value(record)?)
}

/// Overwrite the fields `M` knows about. Unknown names are ignored.
fn overlay(fields: &mut Fields, updates: &[Field]) {
    for update in updates {
        match fields.get_mut(&update.name) {
            Some(slot) => *slot = update.value.clone(),
            None => debug!(field = %update.name, "Destination has no such field, ignoring"),
        }
    }
}

pub(crate) fn apply<St: Store>(shared: &Arc<Shared<St>>, save: &Save) -> SalusResult<ApplyReport> {
    let mut session = Session::new(Arc::clone(shared), WriteMode::Replay);
    let mut report = ApplyReport::default();

    for change in save.changes() {
        let Some(mapping) = shared.destinations.get(&change.entity_type_tag) else {
            warn!(tag = %change.entity_type_tag, "No destination registered for entity type, skipping change");
            report.skipped += 1;
            continue;
        };
        let Some(key) = change.primary_key(mapping.key_kinds) else {
            warn!(tag = %change.entity_type_tag, "Change has an unusable primary key, skipping");
            report.skipped += 1;
            continue;
        };
        let key = RowKey::new(mapping.collection, key);
        let updates = change.updated_fields.as_deref().unwrap_or_default();

        match change.kind {
            ChangeKind::Insert => {
                if session.current_row(&key)?.is_some() {
                    debug!(row = %key, "Row already exists, skipping insert");
                    report.skipped += 1;
                    continue;
                }
                let mut fields = (mapping.blank)()?;
                overlay(&mut fields, updates);
                let fields = (mapping.normalize)(fields)?;
                session.add_fields(key, mapping.key_fields, fields)?;
                report.inserted += 1;
            }
            ChangeKind::Update => {
                let Some(current) = session.current_row(&key)? else {
                    warn!(row = %key, "Row does not exist, skipping update");
                    report.skipped += 1;
                    continue;
                };
                let mut fields = current.clone();
                overlay(&mut fields, updates);
                let fields = (mapping.normalize)(fields)?;
                if fields == current {
                    debug!(row = %key, "Row already up to date");
                    report.skipped += 1;
                    continue;
                }
                session.update_fields(key, mapping.key_fields, fields)?;
                report.updated += 1;
            }
            ChangeKind::Delete => {
                if session.current_row(&key)?.is_none() {
                    debug!(row = %key, "Row does not exist, skipping delete");
                    report.skipped += 1;
                    continue;
                }
                session.remove_key(key, mapping.key_fields)?;
                report.deleted += 1;
            }
        }
    }

    session.save_changes()?;
    debug!(
        inserted = report.inserted,
        updated = report.updated,
        deleted = report.deleted,
        skipped = report.skipped,
        "Applied save"
    );
    Ok(report)
}
