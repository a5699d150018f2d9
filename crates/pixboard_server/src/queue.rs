//! Durable write queue.
//!
//! Accepted placements are appended to a list in the key/value backend and
//! drained later by the [`FlushWorker`](crate::flush::FlushWorker). The list
//! survives server restarts, so a placement is lost only if the backend
//! itself loses it.

use crate::error::ServerResult;
use pixboard_storage::{KvBackend, PlacementRecord};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Largest number of records written in one backend call.
const MAX_PUSH_BATCH: usize = 256;

/// FIFO list of encoded placements under one key.
pub struct DurableQueue {
    backend: Arc<dyn KvBackend>,
    key: String,
}

impl DurableQueue {
    /// Creates a queue stored under `key`.
    pub fn new(backend: Arc<dyn KvBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// Returns the list key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Appends placements to the tail. Returns the new queue length.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend call fails.
    pub fn push(&self, records: &[PlacementRecord]) -> ServerResult<u64> {
        let items = records
            .iter()
            .map(PlacementRecord::to_json_bytes)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.backend.list_push(&self.key, &items)?)
    }

    /// Removes and returns up to `count` items from the head.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    pub fn pop_batch(&self, count: usize) -> ServerResult<Vec<Vec<u8>>> {
        Ok(self.backend.list_pop(&self.key, count)?)
    }

    /// Returns raw items to the tail after a failed flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    pub fn push_back(&self, items: &[Vec<u8>]) -> ServerResult<u64> {
        Ok(self.backend.list_push(&self.key, items)?)
    }

    /// Returns the number of queued items.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    pub fn len(&self) -> ServerResult<u64> {
        Ok(self.backend.list_len(&self.key)?)
    }

    /// Returns true if nothing is queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    pub fn is_empty(&self) -> ServerResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl fmt::Debug for DurableQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableQueue")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Handle to the task that appends placements to the queue.
///
/// The hub hands records over without waiting; the task batches whatever
/// accumulated and pushes it on a blocking thread, preserving order.
#[derive(Debug)]
pub struct QueueWriter {
    tx: mpsc::UnboundedSender<PlacementRecord>,
    task: JoinHandle<()>,
}

impl QueueWriter {
    /// Spawns the writer task. Must be called within a Tokio runtime.
    pub fn spawn(queue: Arc<DurableQueue>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(push_records(queue, rx));
        Self { tx, task }
    }

    /// Hands a record to the writer.
    pub fn submit(&self, record: PlacementRecord) {
        if self.tx.send(record).is_err() {
            warn!("queue writer stopped, placement not enqueued");
        }
    }

    /// Waits for every submitted record to be pushed and stops the task.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(err) = self.task.await {
            warn!(error = %err, "queue writer task failed");
        }
    }
}

async fn push_records(queue: Arc<DurableQueue>, mut rx: mpsc::UnboundedReceiver<PlacementRecord>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while batch.len() < MAX_PUSH_BATCH {
            match rx.try_recv() {
                Ok(record) => batch.push(record),
                Err(_) => break,
            }
        }

        let count = batch.len();
        let worker = Arc::clone(&queue);
        match tokio::task::spawn_blocking(move || worker.push(&batch)).await {
            Ok(Ok(len)) => debug!(count, len, "placements enqueued"),
            Ok(Err(err)) => {
                warn!(key = %queue.key(), count, error = %err, "enqueue failed");
            }
            Err(err) => warn!(key = %queue.key(), count, error = %err, "enqueue task failed"),
        }
    }
}
