use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CaptureError, SalusError, SalusResult};

/// Field name to JSON value, in declaration order.
pub type Fields = serde_json::Map<String, Value>;

/// A row type the session can persist.
///
/// Usually derived with `#[derive(Record)]`. The record's serde representation
/// is its row: each top-level JSON property is a field.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Storage collection the rows live in.
    const COLLECTION: &'static str;
    /// Entity type tag carried in change descriptions.
    const TAG: &'static str;
    /// Serialized names of the primary key fields, in key order.
    const KEY_FIELDS: &'static [&'static str];
    /// Declared kind of each key field, parallel to `KEY_FIELDS`.
    const KEY_KINDS: &'static [KeyKind];
}

/// The key variant a key field is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Int,
    Uuid,
    Str,
}

/// Field types usable as primary key components.
///
/// The derive looks up each key field's kind through this trait, so an
/// unsupported key type is rejected when the record type is compiled.
pub trait KeyType {
    const KIND: KeyKind;
}

macro_rules! key_type {
    ($kind:ident: $($ty:ty),*) => {
        $(
            impl KeyType for $ty {
                const KIND: KeyKind = KeyKind::$kind;
            }
        )*
    };
}

key_type!(Int: i8, i16, i32, i64, u8, u16, u32, u64);
key_type!(Str: String);
key_type!(Uuid: Uuid);

/// A single primary key component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Uuid(Uuid),
    Str(String),
}

impl KeyValue {
    /// Interpret a JSON field value as a key component of the declared kind.
    ///
    /// Strings are only parsed as UUIDs for [`KeyKind::Uuid`] fields.
    pub fn from_json(value: &Value, kind: KeyKind) -> Option<Self> {
        match (kind, value) {
            (KeyKind::Int, Value::Number(n)) => n.as_i64().map(KeyValue::Int),
            (KeyKind::Uuid, Value::String(s)) => Uuid::parse_str(s).ok().map(KeyValue::Uuid),
            (KeyKind::Str, Value::String(s)) => Some(KeyValue::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            KeyValue::Int(n) => Value::from(*n),
            KeyValue::Uuid(uuid) => Value::String(uuid.to_string()),
            KeyValue::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(n) => write!(f, "{}", n),
            KeyValue::Uuid(uuid) => write!(f, "{}", uuid),
            KeyValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Int(value)
    }
}

impl From<i32> for KeyValue {
    fn from(value: i32) -> Self {
        KeyValue::Int(value.into())
    }
}

impl From<Uuid> for KeyValue {
    fn from(value: Uuid) -> Self {
        KeyValue::Uuid(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Str(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        KeyValue::Str(value)
    }
}

/// Anything that names a row within a collection.
pub trait IntoKey {
    fn into_key(self) -> Vec<KeyValue>;
}

macro_rules! scalar_key {
    ($($ty:ty),*) => {
        $(
            impl IntoKey for $ty {
                fn into_key(self) -> Vec<KeyValue> {
                    vec![KeyValue::from(self)]
                }
            }
        )*
    };
}

scalar_key!(i64, i32, Uuid, &str, String);

impl IntoKey for KeyValue {
    fn into_key(self) -> Vec<KeyValue> {
        vec![self]
    }
}

impl IntoKey for Vec<KeyValue> {
    fn into_key(self) -> Vec<KeyValue> {
        self
    }
}

impl IntoKey for &[KeyValue] {
    fn into_key(self) -> Vec<KeyValue> {
        self.to_vec()
    }
}

/// Identity of a row: its collection plus its key values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub collection: String,
    pub key: Vec<KeyValue>,
}

impl RowKey {
    pub fn new(collection: impl Into<String>, key: impl IntoKey) -> Self {
        Self {
            collection: collection.into(),
            key: key.into_key(),
        }
    }

    /// Read the key fields out of a row of `M`.
    pub fn of<M: Record>(fields: &Fields) -> Result<Self, CaptureError> {
        Self::from_fields(M::COLLECTION, M::KEY_FIELDS, M::KEY_KINDS, fields)
    }

    /// Read the key fields out of a row.
    pub fn from_fields(
        collection: &str,
        key_fields: &[&str],
        key_kinds: &[KeyKind],
        fields: &Fields,
    ) -> Result<Self, CaptureError> {
        let mut key = Vec::with_capacity(key_fields.len());
        for (name, kind) in key_fields.iter().zip(key_kinds) {
            let value = fields
                .get(*name)
                .ok_or_else(|| CaptureError::MissingKeyField {
                    collection: collection.to_string(),
                    field: name.to_string(),
                })?;
            let component =
                KeyValue::from_json(value, *kind).ok_or_else(|| CaptureError::UnsupportedKey {
                    collection: collection.to_string(),
                    field: name.to_string(),
                    value: value.to_string(),
                })?;
            key.push(component);
        }
        Ok(Self::new(collection, key))
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.collection)?;
        for (i, component) in self.key.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}", component)?;
        }
        Ok(())
    }
}

pub(crate) fn to_fields<M: Record>(record: &M) -> SalusResult<Fields> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(SalusError::NotAnObject {
            collection: M::COLLECTION.to_string(),
        }),
    }
}

pub(crate) fn from_fields<M: Record>(fields: Fields) -> SalusResult<M> {
    Ok(serde_json::from_value(Value::Object(fields))?)
}
