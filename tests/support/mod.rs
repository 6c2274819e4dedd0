#![allow(dead_code)]

pub mod models;
pub mod senders;

use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use salus::{InMemoryStore, Salus, SalusOptions};
use tracing_subscriber::EnvFilter;

use self::models::{Customer, Order};
use self::senders::RecordingSender;

static TRACING: Once = Once::new();

/// Route logs to the test harness. Filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Options that make immediate sends finish before `save_changes` returns.
pub fn sync_options() -> SalusOptions {
    SalusOptions::default()
        .with_do_not_fire_and_forget(true)
        .with_schema_version("1.0.0-test")
}

/// A producer tracking `Customer` and `Order`.
pub fn producer(sender: RecordingSender, options: SalusOptions) -> Salus<InMemoryStore> {
    init_tracing();
    Salus::builder(InMemoryStore::new(), sender)
        .options(options)
        .track::<Customer>()
        .expect("track customers")
        .track::<Order>()
        .expect("track orders")
        .build()
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
