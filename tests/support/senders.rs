use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use salus::{MessageSender, Save, SendError};

/// Records every accepted payload. Can be switched into failing mode, or
/// told to reject payloads containing a marker.
#[derive(Clone, Default)]
pub struct RecordingSender {
    sent: Arc<Mutex<Vec<String>>>,
    attempts: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    reject: Arc<Mutex<Option<String>>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sender = Self::default();
        sender.set_failing(true);
        sender
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn reject_containing(&self, marker: Option<&str>) {
        *self.reject.lock().unwrap() = marker.map(str::to_string);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn saves(&self) -> Vec<Save> {
        self.sent()
            .iter()
            .map(|payload| Save::from_json(payload).unwrap())
            .collect()
    }
}

impl MessageSender for RecordingSender {
    fn send(&self, payload: &str) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(SendError::new("transport unavailable"));
        }
        if let Some(marker) = self.reject.lock().unwrap().as_deref() {
            if payload.contains(marker) {
                return Err(SendError::new(format!("rejected message containing {marker}")));
            }
        }

        self.sent.lock().unwrap().push(payload.to_string());
        Ok(())
    }
}
