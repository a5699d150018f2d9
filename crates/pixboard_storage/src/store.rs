//! Placement history store trait and in-memory implementation.

use crate::error::StorageResult;
use crate::record::PlacementRecord;
use parking_lot::RwLock;
use std::collections::HashMap;

/// The durable ledger of placements and per-user activity.
///
/// This is the relational side of the system: the server only needs to
/// count history at boot and to commit flush batches. Everything else
/// (leaderboards, user records) is read by other services.
///
/// # Invariants
///
/// - `commit_batch` is atomic: either every record is stored and every user
///   is touched, or nothing changes
/// - `count_placements` reflects every committed batch
pub trait PlacementStore: Send + Sync {
    /// Returns the number of placements ever committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn count_placements(&self) -> StorageResult<u64>;

    /// Stores a batch of placements and touches each user's last-active
    /// timestamp, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; no part of the batch is
    /// committed in that case.
    fn commit_batch(
        &self,
        records: &[PlacementRecord],
        active_users: &[String],
        touched_at: u64,
    ) -> StorageResult<()>;

    /// Deletes every stored placement, returning how many were removed.
    ///
    /// User activity is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn delete_all_placements(&self) -> StorageResult<u64>;
}

#[derive(Debug, Default)]
struct MemoryLedger {
    placements: Vec<PlacementRecord>,
    last_active: HashMap<String, u64>,
}

/// An in-memory placement store.
///
/// Suitable for tests and for running a board without history retention.
#[derive(Debug, Default)]
pub struct InMemoryPlacementStore {
    ledger: RwLock<MemoryLedger>,
}

impl InMemoryPlacementStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored placement in commit order.
    #[must_use]
    pub fn placements(&self) -> Vec<PlacementRecord> {
        self.ledger.read().placements.clone()
    }

    /// Returns a user's last-active timestamp.
    #[must_use]
    pub fn last_active(&self, user_id: &str) -> Option<u64> {
        self.ledger.read().last_active.get(user_id).copied()
    }
}

impl PlacementStore for InMemoryPlacementStore {
    fn count_placements(&self) -> StorageResult<u64> {
        Ok(self.ledger.read().placements.len() as u64)
    }

    fn commit_batch(
        &self,
        records: &[PlacementRecord],
        active_users: &[String],
        touched_at: u64,
    ) -> StorageResult<()> {
        let mut ledger = self.ledger.write();
        ledger.placements.extend_from_slice(records);
        for user in active_users {
            ledger.last_active.insert(user.clone(), touched_at);
        }
        Ok(())
    }

    fn delete_all_placements(&self) -> StorageResult<u64> {
        let mut ledger = self.ledger.write();
        let removed = ledger.placements.len() as u64;
        ledger.placements.clear();
        Ok(removed)
    }
}
