use std::io;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::error::StoreError;
use crate::gate::PurgeGate;
use crate::store::Store;
use crate::worker::PeriodicWorker;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeResult {
    /// No retention window is set, or another purge held the gate.
    pub skipped: bool,
    pub purged: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeStats {
    pub passes: usize,
    pub purged: usize,
    pub errors: usize,
}

/// Deletes delivered outbox rows older than the retention window.
#[derive(Clone)]
pub struct Purger<St> {
    store: St,
    gate: PurgeGate,
    retention: Option<Duration>,
}

impl<St: Store> Purger<St> {
    pub fn new(store: St, gate: PurgeGate, retention: Option<Duration>) -> Self {
        Self {
            store,
            gate,
            retention,
        }
    }

    pub fn purge(&self) -> Result<PurgeResult, StoreError> {
        let skipped = PurgeResult {
            skipped: true,
            purged: 0,
        };

        let Some(retention) = self.retention else {
            debug!("No retention window set, not purging");
            return Ok(skipped);
        };
        let Some(_guard) = self.gate.try_acquire() else {
            debug!("Skipping purge, purge gate is held");
            return Ok(skipped);
        };

        let Some(cutoff) = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return Ok(PurgeResult::default());
        };

        let purged = self.store.outbox_purge(cutoff)?;
        if purged > 0 {
            info!(purged, %cutoff, "Purged delivered outbox records");
        }
        Ok(PurgeResult {
            skipped: false,
            purged,
        })
    }

    pub fn spawn(self, interval: Duration) -> io::Result<PeriodicWorker<PurgeStats>> {
        PeriodicWorker::spawn("salus-purge", interval, move |stats: &mut PurgeStats| {
            stats.passes += 1;
            match self.purge() {
                Ok(result) => stats.purged += result.purged,
                Err(err) => {
                    stats.errors += 1;
                    error!(error = %err, "Error purging outbox");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::{OutboxRecord, SaveId};
    use crate::store::{InMemoryStore, Write, WriteBatch};

    fn store_with(records: Vec<OutboxRecord>) -> InMemoryStore {
        let store = InMemoryStore::new();
        let mut batch = WriteBatch::new();
        for record in records {
            batch.push(Write::InsertOutbox(record));
        }
        store.commit(batch).unwrap();
        store
    }

    #[test]
    fn without_retention_nothing_is_purged() {
        let now = Utc::now();
        let mut done = OutboxRecord::pending(SaveId(1), "{}".into(), now - chrono::Duration::days(30));
        done.complete(now - chrono::Duration::days(30));
        let store = store_with(vec![done]);

        let purger = Purger::new(store.clone(), PurgeGate::new(), None);
        assert_eq!(purger.purge().unwrap(), PurgeResult { skipped: true, purged: 0 });
        assert_eq!(store.outbox_all().unwrap().len(), 1);
    }

    #[test]
    fn held_gate_skips() {
        let gate = PurgeGate::new();
        let purger = Purger::new(InMemoryStore::new(), gate.clone(), Some(Duration::from_secs(1)));

        let _held = gate.try_acquire().unwrap();
        assert!(purger.purge().unwrap().skipped);
    }

    #[test]
    fn removes_only_old_completed_rows() {
        let now = Utc::now();
        let mut old = OutboxRecord::pending(SaveId(1), "{}".into(), now - chrono::Duration::hours(3));
        old.complete(now - chrono::Duration::hours(2));
        let mut fresh = OutboxRecord::pending(SaveId(2), "{}".into(), now);
        fresh.complete(now);
        let stuck = OutboxRecord::pending(SaveId(3), "{}".into(), now - chrono::Duration::days(9));
        let store = store_with(vec![old, fresh, stuck]);

        let purger = Purger::new(store.clone(), PurgeGate::new(), Some(Duration::from_secs(3600)));
        assert_eq!(purger.purge().unwrap(), PurgeResult { skipped: false, purged: 1 });

        let ids: Vec<_> = store.outbox_all().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![SaveId(2), SaveId(3)]);
    }
}
