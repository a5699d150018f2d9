//! Key/value backend trait definition.

use crate::error::{StorageError, StorageResult};

/// Maximum key length accepted by any backend.
const MAX_KEY_LEN: usize = 128;

/// A key/value store with FIFO lists.
///
/// Backends are **opaque byte stores**. Plain keys hold a single value that
/// is replaced wholesale by [`set`](KvBackend::set); list keys hold an
/// ordered sequence of items appended at the tail and removed from the head.
/// A key is used either as a value or as a list, never both.
///
/// # Invariants
///
/// - `get` returns exactly the bytes of the last successful `set`
/// - `list_pop` returns items in the order they were pushed
/// - Items pushed by one `list_push` call are stored together or not at all
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait KvBackend: Send + Sync {
    /// Reads the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes a value or list. Returns true if something was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Appends items at the tail of the list, returning the new length.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails. On error
    /// none of the items were appended.
    fn list_push(&self, key: &str, items: &[Vec<u8>]) -> StorageResult<u64>;

    /// Removes and returns up to `count` items from the head of the list.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the list cannot be rewritten.
    /// On error no items were removed.
    fn list_pop(&self, key: &str, count: usize) -> StorageResult<Vec<Vec<u8>>>;

    /// Returns the number of items in the list (0 if absent).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn list_len(&self, key: &str) -> StorageResult<u64>;
}

/// Checks that a key is usable by every backend.
///
/// Keys are 1 to 128 characters of ASCII letters, digits, `-`, `_`, `.`
/// and `:`, and must not start with `.`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] otherwise.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
