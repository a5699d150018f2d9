//! In-memory key/value backend for testing.

use crate::backend::{validate_key, KvBackend};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

/// An in-memory key/value backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral boards that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use pixboard_storage::{KvBackend, InMemoryBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.set("grid", &[0, 1, 2]).unwrap();
/// assert_eq!(backend.get("grid").unwrap(), Some(vec![0, 1, 2]));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    values: RwLock<HashMap<String, Vec<u8>>>,
    lists: RwLock<HashMap<String, VecDeque<Vec<u8>>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every item currently in a list.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn list_items(&self, key: &str) -> Vec<Vec<u8>> {
        self.lists
            .read()
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Clears all data from the backend.
    pub fn clear(&self) {
        self.values.write().clear();
        self.lists.write().clear();
    }
}

impl KvBackend for InMemoryBackend {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.values.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let removed_value = self.values.write().remove(key).is_some();
        let removed_list = self.lists.write().remove(key).is_some();
        Ok(removed_value || removed_list)
    }

    fn list_push(&self, key: &str, items: &[Vec<u8>]) -> StorageResult<u64> {
        validate_key(key)?;
        let mut lists = self.lists.write();
        let list = lists.entry(key.to_string()).or_default();
        list.extend(items.iter().cloned());
        Ok(list.len() as u64)
    }

    fn list_pop(&self, key: &str, count: usize) -> StorageResult<Vec<Vec<u8>>> {
        validate_key(key)?;
        let mut lists = self.lists.write();
        let Some(list) = lists.get_mut(key) else {
            return Ok(Vec::new());
        };

        let take = count.min(list.len());
        let popped: Vec<Vec<u8>> = list.drain(..take).collect();
        if list.is_empty() {
            lists.remove(key);
        }
        Ok(popped)
    }

    fn list_len(&self, key: &str) -> StorageResult<u64> {
        validate_key(key)?;
        Ok(self.lists.read().get(key).map_or(0, |l| l.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.get("grid").unwrap(), None);
        assert_eq!(backend.list_len("queue").unwrap(), 0);
    }

    #[test]
    fn memory_set_replaces_value() {
        let backend = InMemoryBackend::new();
        backend.set("grid", b"first").unwrap();
        backend.set("grid", b"second").unwrap();
        assert_eq!(backend.get("grid").unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn memory_list_is_fifo() {
        let backend = InMemoryBackend::new();
        let len = backend
            .list_push("queue", &[b"1".to_vec(), b"2".to_vec(), b"3".to_vec()])
            .unwrap();
        assert_eq!(len, 3);

        assert_eq!(backend.list_pop("queue", 2).unwrap(), vec![b"1".to_vec(), b"2".to_vec()]);
        assert_eq!(backend.list_pop("queue", 5).unwrap(), vec![b"3".to_vec()]);
        assert!(backend.list_pop("queue", 5).unwrap().is_empty());
    }

    #[test]
    fn memory_pop_missing_list() {
        let backend = InMemoryBackend::new();
        assert!(backend.list_pop("nothing", 10).unwrap().is_empty());
    }

    #[test]
    fn memory_delete() {
        let backend = InMemoryBackend::new();
        backend.set("grid", b"x").unwrap();
        backend.list_push("queue", &[b"y".to_vec()]).unwrap();

        assert!(backend.delete("grid").unwrap());
        assert!(backend.delete("queue").unwrap());
        assert!(!backend.delete("grid").unwrap());
    }

    #[test]
    fn memory_rejects_invalid_key() {
        let backend = InMemoryBackend::new();
        let result = backend.set("a/b", b"x");
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn memory_clear() {
        let backend = InMemoryBackend::new();
        backend.set("grid", b"x").unwrap();
        backend.list_push("queue", &[b"y".to_vec()]).unwrap();
        backend.clear();
        assert_eq!(backend.get("grid").unwrap(), None);
        assert!(backend.list_items("queue").is_empty());
    }
}
