//! Non-blocking, process-wide mutual exclusion.
//!
//! Delivery and purging each take their own gate. Contenders never wait:
//! `try_acquire` either hands back a guard or `None`, and dropping the guard
//! releases the gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct Gate {
    held: Arc<AtomicBool>,
}

impl Gate {
    fn try_acquire(&self) -> Option<GateGuard> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| GateGuard {
                held: Arc::clone(&self.held),
            })
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Holds a gate until dropped. Can be moved to another thread.
#[must_use = "the gate is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct GateGuard {
    held: Arc<AtomicBool>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

/// Serializes message delivery between immediate sends and the queue processor.
#[derive(Debug, Clone, Default)]
pub struct DispatchGate(Gate);

impl DispatchGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<GateGuard> {
        self.0.try_acquire()
    }

    pub fn is_held(&self) -> bool {
        self.0.is_held()
    }
}

/// Keeps purge passes from overlapping.
#[derive(Debug, Clone, Default)]
pub struct PurgeGate(Gate);

impl PurgeGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<GateGuard> {
        self.0.try_acquire()
    }

    pub fn is_held(&self) -> bool {
        self.0.is_held()
    }
}
