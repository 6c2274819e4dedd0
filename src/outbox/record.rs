use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned identity of a save. Strictly increasing in commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SaveId(pub u64);

impl fmt::Display for SaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistent delivery state of one save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: SaveId,
    pub created_at: DateTime<Utc>,
    /// Once set the record is frozen.
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Serialized [`Save`](crate::Save).
    pub payload: String,
}

impl OutboxRecord {
    /// A new undelivered record, due immediately.
    pub fn pending(id: SaveId, payload: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            completed_at: None,
            failed_attempts: 0,
            last_failed_at: None,
            next_attempt_at: Some(now),
            payload,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed() && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        if !self.is_completed() {
            self.completed_at = Some(now);
        }
    }

    /// Record a failed attempt.
    ///
    /// `next_attempt_at` is computed by the caller from the attempt count
    /// before this call increments it.
    pub fn fail(&mut self, now: DateTime<Utc>, next_attempt_at: DateTime<Utc>) {
        if self.is_completed() {
            return;
        }
        self.last_failed_at = Some(now);
        self.next_attempt_at = Some(next_attempt_at);
        self.failed_attempts = self.failed_attempts.saturating_add(1);
    }

    pub fn mark_ready(&mut self, now: DateTime<Utc>) {
        if !self.is_completed() {
            self.next_attempt_at = Some(now);
        }
    }
}
