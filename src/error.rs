use thiserror::Error;

use crate::outbox::SaveId;

/// Misconfiguration detected while building a [`Salus`](crate::Salus) instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("record type in collection {collection} declares no primary key fields")]
    NoKey { collection: String },
    #[error("entity type tag {tag} is registered more than once")]
    DuplicateTag { tag: String },
    #[error("collection {collection} is registered more than once")]
    DuplicateCollection { collection: String },
}

/// A tracked record could not be turned into a change description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("{collection} record has no value for key field {field}")]
    MissingKeyField { collection: String, field: String },
    #[error("{collection} key field {field} holds {value}, which is not an integer, uuid or string")]
    UnsupportedKey {
        collection: String,
        field: String,
        value: String,
    },
    #[error("{collection} record is tracked without its field values")]
    MissingValues { collection: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("row {0} already exists")]
    Conflict(String),
    #[error("row {0} does not exist")]
    Missing(String),
    #[error("outbox record {0} already exists")]
    OutboxConflict(SaveId),
    #[error("outbox record {0} does not exist")]
    OutboxMissing(SaveId),
    #[error("outbox record {0} is already completed")]
    OutboxCompleted(SaveId),
    #[error("storage failure: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum SalusError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{collection} record did not serialize to a JSON object")]
    NotAnObject { collection: String },
    #[error("row {0} does not exist")]
    NotFound(String),
    #[error("row {0} already exists")]
    AlreadyExists(String),
    #[error("a transaction is already open on this session")]
    TransactionInProgress,
}

pub type SalusResult<T> = Result<T, SalusError>;

/// Failure reported by a [`MessageSender`](crate::MessageSender).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SendError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
