use std::sync::{Arc, Mutex};

use tracing::info;

use crate::error::SendError;

#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;

/// Delivers serialized saves to the messaging transport.
///
/// `Ok` means the transport accepted the message. Any error schedules a retry.
pub trait MessageSender: Send + Sync {
    fn send(&self, payload: &str) -> Result<(), SendError>;
}

impl<S: MessageSender + ?Sized> MessageSender for Arc<S> {
    fn send(&self, payload: &str) -> Result<(), SendError> {
        (**self).send(payload)
    }
}

impl<S: MessageSender + ?Sized> MessageSender for Box<S> {
    fn send(&self, payload: &str) -> Result<(), SendError> {
        (**self).send(payload)
    }
}

/// Writes each message to the log, or to a shared buffer.
#[derive(Debug, Clone, Default)]
pub struct LogSender {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogSender {
    pub fn new() -> Self {
        Self { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            buffer: Some(buffer),
        }
    }
}

impl MessageSender for LogSender {
    fn send(&self, payload: &str) -> Result<(), SendError> {
        match &self.buffer {
            Some(buffer) => {
                let mut buffer = buffer
                    .lock()
                    .map_err(|_| SendError::new("log sender buffer poisoned"))?;
                buffer.push(payload.to_string());
            }
            None => info!(target: "salus::outbox", payload, "outbox message"),
        }
        Ok(())
    }
}

/// Adapts a closure into a [`MessageSender`].
pub struct FnSender<F>(F);

impl<F> FnSender<F>
where
    F: Fn(&str) -> Result<(), SendError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> MessageSender for FnSender<F>
where
    F: Fn(&str) -> Result<(), SendError> + Send + Sync,
{
    fn send(&self, payload: &str) -> Result<(), SendError> {
        (self.0)(payload)
    }
}

/// Emits each message on an in-process [`EventEmitter`].
///
/// Listeners run on the emitter's own threads, so delivery is complete once
/// the event is emitted. Requires the `emitter` feature.
#[cfg(feature = "emitter")]
pub struct EmitterSender {
    emitter: Mutex<EventEmitter>,
    event: String,
}

#[cfg(feature = "emitter")]
impl EmitterSender {
    pub const DEFAULT_EVENT: &'static str = "salus.save";

    pub fn new(emitter: EventEmitter) -> Self {
        Self::with_event(emitter, Self::DEFAULT_EVENT)
    }

    pub fn with_event(emitter: EventEmitter, event: impl Into<String>) -> Self {
        Self {
            emitter: Mutex::new(emitter),
            event: event.into(),
        }
    }
}

#[cfg(feature = "emitter")]
impl MessageSender for EmitterSender {
    fn send(&self, payload: &str) -> Result<(), SendError> {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| SendError::new("event emitter lock poisoned"))?;
        emitter.emit(&self.event, payload.to_string());
        Ok(())
    }
}

#[cfg(feature = "async")]
pub use self::blocking::{AsyncMessageSender, BlockingSender, SendFuture};

#[cfg(feature = "async")]
mod blocking {
    use std::future::Future;
    use std::pin::Pin;
    use std::thread;

    use tokio::runtime::{Builder, Handle, Runtime};

    use super::MessageSender;
    use crate::error::SendError;

    pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + 'a>>;

    /// A sender whose transport is asynchronous.
    pub trait AsyncMessageSender: Send + Sync {
        fn send<'a>(&'a self, payload: &'a str) -> SendFuture<'a>;
    }

    /// Drives an [`AsyncMessageSender`] on its own current-thread runtime so it
    /// can be used wherever a blocking [`MessageSender`] is expected.
    ///
    /// Safe to call from inside another tokio runtime: the send is then driven
    /// on a short-lived helper thread, since runtimes cannot block on each other.
    pub struct BlockingSender<A> {
        inner: A,
        // Only taken in `drop`.
        runtime: Option<Runtime>,
    }

    impl<A: AsyncMessageSender> BlockingSender<A> {
        pub fn new(inner: A) -> std::io::Result<Self> {
            let runtime = Builder::new_current_thread().enable_all().build()?;
            Ok(Self {
                inner,
                runtime: Some(runtime),
            })
        }

        fn block_on(&self, payload: &str) -> Result<(), SendError> {
            match &self.runtime {
                Some(runtime) => runtime.block_on(self.inner.send(payload)),
                None => Err(SendError::new("async sender runtime is shut down")),
            }
        }
    }

    impl<A> Drop for BlockingSender<A> {
        fn drop(&mut self) {
            // A plain drop blocks, which panics inside another runtime.
            if let Some(runtime) = self.runtime.take() {
                runtime.shutdown_background();
            }
        }
    }

    impl<A: AsyncMessageSender> MessageSender for BlockingSender<A> {
        fn send(&self, payload: &str) -> Result<(), SendError> {
            if Handle::try_current().is_err() {
                return self.block_on(payload);
            }

            thread::scope(|scope| {
                scope
                    .spawn(|| self.block_on(payload))
                    .join()
                    .unwrap_or_else(|_| Err(SendError::new("async sender panicked")))
            })
        }
    }
}
