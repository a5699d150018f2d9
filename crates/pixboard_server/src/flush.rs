//! Flush worker: drains the durable queue into the placement store.

use crate::queue::DurableQueue;
use pixboard_protocol::timestamp_ms;
use pixboard_storage::{PlacementRecord, PlacementStore};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Result of one flush cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another cycle was already running.
    Skipped,
    /// The queue was empty.
    Empty,
    /// A batch was committed.
    Committed {
        /// Placements written.
        records: usize,
        /// Distinct users touched.
        users: usize,
        /// Undecodable items discarded.
        dropped: usize,
    },
    /// The transaction failed and the popped items were returned to the queue.
    Requeued {
        /// Items pushed back.
        items: usize,
        /// Why the transaction failed.
        error: String,
    },
    /// The queue itself could not be read or written.
    QueueUnavailable(String),
}

/// Periodically moves placements from the durable queue into the store.
///
/// One cycle pops up to `batch_size` items, commits them in one transaction
/// and touches each distinct user once. When the transaction fails every
/// popped item goes back to the queue tail, so delivery is at least once.
pub struct FlushWorker {
    queue: Arc<DurableQueue>,
    store: Arc<dyn PlacementStore>,
    batch_size: usize,
    running: AtomicBool,
}

/// Clears the running flag when a cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FlushWorker {
    /// Creates a worker.
    pub fn new(queue: Arc<DurableQueue>, store: Arc<dyn PlacementStore>, batch_size: usize) -> Self {
        Self {
            queue,
            store,
            batch_size: batch_size.max(1),
            running: AtomicBool::new(false),
        }
    }

    /// Returns true while a cycle is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one flush cycle on the calling thread.
    pub fn flush_once(&self) -> FlushOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return FlushOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        let items = match self.queue.pop_batch(self.batch_size) {
            Ok(items) => items,
            Err(err) => {
                warn!(key = %self.queue.key(), error = %err, "cannot pop flush batch");
                return FlushOutcome::QueueUnavailable(err.to_string());
            }
        };
        if items.is_empty() {
            return FlushOutcome::Empty;
        }

        let mut records = Vec::with_capacity(items.len());
        let mut dropped = 0;
        for item in &items {
            match PlacementRecord::from_json_bytes(item) {
                Ok(record) => records.push(record),
                Err(err) => {
                    dropped += 1;
                    warn!(key = %self.queue.key(), error = %err, "dropping undecodable queue item");
                }
            }
        }
        let users = distinct_users(&records);

        if records.is_empty() {
            return FlushOutcome::Committed {
                records: 0,
                users: 0,
                dropped,
            };
        }

        match self.store.commit_batch(&records, &users, timestamp_ms()) {
            Ok(()) => {
                debug!(count = records.len(), users = users.len(), "flush committed");
                FlushOutcome::Committed {
                    records: records.len(),
                    users: users.len(),
                    dropped,
                }
            }
            Err(err) => {
                warn!(key = %self.queue.key(), count = items.len(), error = %err, "flush transaction failed, requeueing");
                if let Err(push_err) = self.queue.push_back(&items) {
                    warn!(key = %self.queue.key(), count = items.len(), error = %push_err, "requeue failed, batch lost");
                    return FlushOutcome::QueueUnavailable(push_err.to_string());
                }
                FlushOutcome::Requeued {
                    items: items.len(),
                    error: err.to_string(),
                }
            }
        }
    }

    /// Runs cycles every `period` until `shutdown` turns true, then runs a
    /// final cycle. Each cycle executes on a blocking thread.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let outcome = self.cycle().await;
        info!(?outcome, "final flush");
    }

    async fn cycle(self: &Arc<Self>) -> FlushOutcome {
        let worker = Arc::clone(self);
        match tokio::task::spawn_blocking(move || worker.flush_once()).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "flush task failed");
                FlushOutcome::QueueUnavailable(err.to_string())
            }
        }
    }
}

impl fmt::Debug for FlushWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushWorker")
            .field("queue", &self.queue)
            .field("batch_size", &self.batch_size)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Returns each user id once, in first-seen order.
fn distinct_users(records: &[PlacementRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| record.user_id.as_deref())
        .filter(|user| seen.insert(*user))
        .map(str::to_string)
        .collect()
}
