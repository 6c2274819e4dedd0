use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::outbox::SaveId;
use crate::record::{KeyKind, KeyValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One named field value on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A row-level change inside a [`Save`].
///
/// `updated_fields` is `None` for deletes. Inserts carry every field, updates
/// only the ones whose value changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub kind: ChangeKind,
    pub entity_type_tag: String,
    pub updated_fields: Option<Vec<Field>>,
    pub primary_key_fields: Vec<Field>,
}

impl Change {
    pub fn insert(tag: impl Into<String>, fields: Vec<Field>, key: Vec<Field>) -> Self {
        Self {
            kind: ChangeKind::Insert,
            entity_type_tag: tag.into(),
            updated_fields: Some(fields),
            primary_key_fields: key,
        }
    }

    pub fn update(tag: impl Into<String>, fields: Vec<Field>, key: Vec<Field>) -> Self {
        Self {
            kind: ChangeKind::Update,
            entity_type_tag: tag.into(),
            updated_fields: Some(fields),
            primary_key_fields: key,
        }
    }

    pub fn delete(tag: impl Into<String>, key: Vec<Field>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            entity_type_tag: tag.into(),
            updated_fields: None,
            primary_key_fields: key,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.updated_fields
            .as_ref()?
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    /// Key values in key order, read as `kinds`. `None` if the number of
    /// components differs or one does not fit its kind.
    pub fn primary_key(&self, kinds: &[KeyKind]) -> Option<Vec<KeyValue>> {
        if self.primary_key_fields.len() != kinds.len() {
            return None;
        }
        self.primary_key_fields
            .iter()
            .zip(kinds)
            .map(|(f, kind)| KeyValue::from_json(&f.value, *kind))
            .collect()
    }
}

/// The unit of transmission: every change from one `save_changes` call.
///
/// A save is never empty. Its id is assigned by the store when the outbox
/// row is recorded and is not part of the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Save {
    #[serde(skip)]
    id: Option<SaveId>,
    schema_version: String,
    changes: Vec<Change>,
}

impl Save {
    /// Returns `None` when there are no changes to carry.
    pub fn new(schema_version: impl Into<String>, changes: Vec<Change>) -> Option<Self> {
        if changes.is_empty() {
            return None;
        }
        Some(Self {
            id: None,
            schema_version: schema_version.into(),
            changes,
        })
    }

    pub fn id(&self) -> Option<SaveId> {
        self.id
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub(crate) fn assign_id(&mut self, id: SaveId) {
        self.id = Some(id);
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
