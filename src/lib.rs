//! Transactional outbox for mutable record stores.
//!
//! Every [`Session::save_changes`] captures the field-level changes of the
//! tracked record types into a [`Save`] and commits it as an outbox row in
//! the same atomic write as the data. Saves are then delivered through a
//! [`MessageSender`] in commit order, at least once: immediately after the
//! commit when possible, otherwise by the [`QueueProcessor`] with retries.
//! Delivered rows are removed by the [`Purger`] after a retention window.
//!
//! On the receiving side [`Salus::apply`] writes a save's changes to local
//! records idempotently and without capturing them again.

extern crate self as salus;

mod capture;
mod change;
mod config;
mod coordinator;
mod dispatch;
mod engine;
mod error;
mod gate;
mod outbox;
mod purge;
mod queue;
mod record;
mod replay;
mod retry;
mod sender;
mod session;
mod store;
mod tracker;
mod worker;

pub use capture::{ChangeCapture, SourceRegistry, WriteMode};
pub use change::{Change, ChangeKind, Field, Save};
pub use config::{RetryConfig, SalusConfig, SalusOptions};
pub use dispatch::{Dispatcher, Severity};
pub use engine::{BackgroundWorkers, Salus, SalusBuilder};
pub use error::{CaptureError, ConfigError, SalusError, SalusResult, SendError, StoreError};
pub use gate::{DispatchGate, GateGuard, PurgeGate};
pub use outbox::{OutboxRecord, SaveId};
pub use purge::{PurgeResult, PurgeStats, Purger};
pub use queue::{DrainResult, QueueProcessor, QueueStats};
pub use record::{Fields, IntoKey, KeyKind, KeyType, KeyValue, Record, RowKey};
pub use replay::{ApplyReport, DestinationRegistry};
pub use retry::{ConstantRetry, ExponentialBackoffRetry, RetryStrategy};
pub use sender::{FnSender, LogSender, MessageSender};
pub use session::{Session, Transaction};
pub use store::{InMemoryStore, Store, Write, WriteBatch};
pub use tracker::{ChangeTracker, DirtyRecord, RecordState};
pub use worker::PeriodicWorker;

#[cfg(feature = "emitter")]
pub use sender::{EmitterSender, EventEmitter};

#[cfg(feature = "async")]
pub use sender::{AsyncMessageSender, BlockingSender, SendFuture};

pub use salus_macros::Record;
