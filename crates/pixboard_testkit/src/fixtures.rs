//! Test fixtures.
//!
//! Provides temporary data directories and backends whose failures can be
//! switched on and off from the test.

use pixboard_storage::{
    FileBackend, FilePlacementStore, InMemoryBackend, InMemoryPlacementStore, KvBackend,
    PlacementRecord, PlacementStore, StorageError, StorageResult,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

/// A data directory with file backends, removed on drop.
pub struct TestDataDir {
    /// Key/value backend rooted at `<dir>/kv`.
    pub kv: FileBackend,
    /// Placement history at `<dir>/history.jsonl`.
    pub store: FilePlacementStore,
    temp_dir: TempDir,
}

impl TestDataDir {
    /// Creates a fresh data directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (kv, store) = open_backends(temp_dir.path()).expect("Failed to open backends");
        Self {
            kv,
            store,
            temp_dir,
        }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Closes the backends and returns the directory, so it can be reopened.
    pub fn into_temp_dir(self) -> TempDir {
        self.temp_dir
    }
}

impl Default for TestDataDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the `(kv, history)` paths used under a data directory.
pub fn data_paths(root: &Path) -> (PathBuf, PathBuf) {
    (root.join("kv"), root.join("history.jsonl"))
}

/// Opens the file backends of a data directory.
pub fn open_backends(root: &Path) -> StorageResult<(FileBackend, FilePlacementStore)> {
    let (kv_path, history_path) = data_paths(root);
    Ok((
        FileBackend::open(&kv_path)?,
        FilePlacementStore::open(&history_path)?,
    ))
}

fn outage() -> StorageError {
    StorageError::Unavailable("injected failure".into())
}

/// A placement store that fails every call while switched off.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryPlacementStore,
    failing: AtomicBool,
    failed_commits: AtomicUsize,
}

impl FlakyStore {
    /// Creates a healthy, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches failure injection.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the committed placements.
    pub fn placements(&self) -> Vec<PlacementRecord> {
        self.inner.placements()
    }

    /// Returns the last-active timestamp of a user.
    pub fn last_active(&self, user_id: &str) -> Option<u64> {
        self.inner.last_active(user_id)
    }

    /// Returns how many commits were refused.
    pub fn failed_commits(&self) -> usize {
        self.failed_commits.load(Ordering::SeqCst)
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(outage())
        } else {
            Ok(())
        }
    }
}

impl PlacementStore for FlakyStore {
    fn count_placements(&self) -> StorageResult<u64> {
        self.check()?;
        self.inner.count_placements()
    }

    fn commit_batch(
        &self,
        records: &[PlacementRecord],
        active_users: &[String],
        touched_at: u64,
    ) -> StorageResult<()> {
        if let Err(err) = self.check() {
            self.failed_commits.fetch_add(1, Ordering::SeqCst);
            return Err(err);
        }
        self.inner.commit_batch(records, active_users, touched_at)
    }

    fn delete_all_placements(&self) -> StorageResult<u64> {
        self.check()?;
        self.inner.delete_all_placements()
    }
}

/// A key/value backend that fails every call while switched off.
#[derive(Debug, Default)]
pub struct FlakyBackend {
    inner: InMemoryBackend,
    failing: AtomicBool,
}

impl FlakyBackend {
    /// Creates a healthy, empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches failure injection.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the wrapped backend, bypassing failure injection.
    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(outage())
        } else {
            Ok(())
        }
    }
}

impl KvBackend for FlakyBackend {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.check()?;
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        self.check()?;
        self.inner.delete(key)
    }

    fn list_push(&self, key: &str, items: &[Vec<u8>]) -> StorageResult<u64> {
        self.check()?;
        self.inner.list_push(key, items)
    }

    fn list_pop(&self, key: &str, count: usize) -> StorageResult<Vec<Vec<u8>>> {
        self.check()?;
        self.inner.list_pop(key, count)
    }

    fn list_len(&self, key: &str) -> StorageResult<u64> {
        self.check()?;
        self.inner.list_len(key)
    }
}
