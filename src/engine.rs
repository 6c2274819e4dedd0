use std::io;
use std::sync::Arc;

use tracing::info;

use crate::capture::{SourceRegistry, WriteMode};
use crate::change::Save;
use crate::config::SalusOptions;
use crate::dispatch::Dispatcher;
use crate::error::{ConfigError, SalusResult, StoreError};
use crate::gate::{DispatchGate, PurgeGate};
use crate::purge::{PurgeResult, PurgeStats, Purger};
use crate::queue::{DrainResult, QueueProcessor, QueueStats};
use crate::record::Record;
use crate::replay::{self, ApplyReport, DestinationRegistry};
use crate::sender::MessageSender;
use crate::session::Session;
use crate::store::{InMemoryStore, Store};
use crate::worker::PeriodicWorker;

pub(crate) struct Shared<St> {
    pub(crate) store: St,
    pub(crate) sender: Arc<dyn MessageSender>,
    pub(crate) options: Arc<SalusOptions>,
    pub(crate) sources: SourceRegistry,
    pub(crate) destinations: DestinationRegistry,
    pub(crate) dispatch_gate: DispatchGate,
    pub(crate) purge_gate: PurgeGate,
}

impl<St: Store> Shared<St> {
    pub(crate) fn dispatcher(&self) -> Dispatcher<St> {
        Dispatcher::new(
            self.store.clone(),
            Arc::clone(&self.sender),
            Arc::clone(&self.options),
        )
    }
}

/// A configured outbox over one store.
///
/// Cheap to clone; clones share the store, the sender and both gates.
///
/// ```
/// use salus::{InMemoryStore, LogSender, Record, Salus};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, Record)]
/// struct Customer {
///     id: i64,
///     name: String,
/// }
///
/// let salus = Salus::builder(InMemoryStore::new(), LogSender::new())
///     .track::<Customer>()
///     .unwrap()
///     .build();
///
/// let mut session = salus.session();
/// session.add(&Customer { id: 1, name: "Ada".into() }).unwrap();
/// session.save_changes().unwrap();
/// ```
pub struct Salus<St: Store = InMemoryStore> {
    shared: Arc<Shared<St>>,
}

impl<St: Store> Clone for Salus<St> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<St: Store> Salus<St> {
    pub fn builder(store: St, sender: impl MessageSender + 'static) -> SalusBuilder<St> {
        SalusBuilder::new(store, sender)
    }

    /// A session whose saves are captured into the outbox.
    pub fn session(&self) -> Session<St> {
        Session::new(Arc::clone(&self.shared), WriteMode::Capture)
    }

    pub fn store(&self) -> &St {
        &self.shared.store
    }

    pub fn options(&self) -> &SalusOptions {
        &self.shared.options
    }

    pub fn dispatch_gate(&self) -> &DispatchGate {
        &self.shared.dispatch_gate
    }

    pub fn dispatcher(&self) -> Dispatcher<St> {
        self.shared.dispatcher()
    }

    pub fn queue_processor(&self) -> QueueProcessor<St> {
        QueueProcessor::new(self.shared.dispatcher(), self.shared.dispatch_gate.clone())
    }

    pub fn purger(&self) -> Purger<St> {
        Purger::new(
            self.shared.store.clone(),
            self.shared.purge_gate.clone(),
            self.shared.options.retention(),
        )
    }

    /// Run one queue pass on the calling thread.
    pub fn process_queue(&self) -> Result<DrainResult, StoreError> {
        self.queue_processor().process_queue()
    }

    /// Run one purge pass on the calling thread.
    pub fn purge(&self) -> Result<PurgeResult, StoreError> {
        self.purger().purge()
    }

    /// Start the queue processor, and the purger when a retention window is set.
    pub fn start_background(&self) -> io::Result<BackgroundWorkers> {
        let options = &self.shared.options;
        let queue = self.queue_processor().spawn(options.queue_interval())?;
        let purger = match options.retention() {
            Some(_) => Some(self.purger().spawn(options.purge_interval())?),
            None => None,
        };

        info!(
            queue_interval = ?options.queue_interval(),
            purging = purger.is_some(),
            "Started outbox background workers"
        );
        Ok(BackgroundWorkers { queue, purger })
    }

    /// Apply a received save to the local store without capturing it.
    pub fn apply(&self, save: &Save) -> SalusResult<ApplyReport> {
        replay::apply(&self.shared, save)
    }

    /// Deserialize and [`apply`](Self::apply) a received message.
    pub fn apply_json(&self, payload: &str) -> SalusResult<ApplyReport> {
        let save = Save::from_json(payload)?;
        self.apply(&save)
    }
}

pub struct SalusBuilder<St> {
    store: St,
    sender: Arc<dyn MessageSender>,
    options: SalusOptions,
    sources: SourceRegistry,
    destinations: DestinationRegistry,
}

impl<St: Store> SalusBuilder<St> {
    pub fn new(store: St, sender: impl MessageSender + 'static) -> Self {
        Self {
            store,
            sender: Arc::new(sender),
            options: SalusOptions::default(),
            sources: SourceRegistry::default(),
            destinations: DestinationRegistry::default(),
        }
    }

    pub fn options(mut self, options: SalusOptions) -> Self {
        self.options = options;
        self
    }

    /// Capture changes to `M` under its own entity type tag.
    pub fn track<M: Record>(self) -> Result<Self, ConfigError> {
        self.track_as::<M>(M::TAG)
    }

    pub fn track_as<M: Record>(mut self, tag: &str) -> Result<Self, ConfigError> {
        self.sources.register::<M>(tag)?;
        Ok(self)
    }

    /// Apply received changes tagged with `M`'s entity type tag to `M` rows.
    pub fn destination<M: Record + Default>(self) -> Result<Self, ConfigError> {
        self.destination_as::<M>(M::TAG)
    }

    pub fn destination_as<M: Record + Default>(mut self, tag: &str) -> Result<Self, ConfigError> {
        self.destinations.register::<M>(tag)?;
        Ok(self)
    }

    pub fn build(self) -> Salus<St> {
        info!(
            sources = self.sources.len(),
            destinations = self.destinations.len(),
            schema_version = self.options.schema_version(),
            "Salus configured"
        );

        Salus {
            shared: Arc::new(Shared {
                store: self.store,
                sender: self.sender,
                options: Arc::new(self.options),
                sources: self.sources,
                destinations: self.destinations,
                dispatch_gate: DispatchGate::new(),
                purge_gate: PurgeGate::new(),
            }),
        }
    }
}

/// Handles to the running background workers.
pub struct BackgroundWorkers {
    queue: PeriodicWorker<QueueStats>,
    purger: Option<PeriodicWorker<PurgeStats>>,
}

impl BackgroundWorkers {
    pub fn is_purging(&self) -> bool {
        self.purger.is_some()
    }

    pub fn signal_stop(&self) {
        self.queue.signal_stop();
        if let Some(purger) = &self.purger {
            purger.signal_stop();
        }
    }

    /// Stop both workers and wait for them.
    pub fn stop(self) -> (QueueStats, Option<PurgeStats>) {
        let queue = self.queue.stop();
        let purger = self.purger.map(PeriodicWorker::stop);
        (queue, purger)
    }
}
