//! Legacy string-grid compatibility shim.
//!
//! Older clients and tools read the canvas as a JSON array of literal color
//! strings, one per cell in row-major order. The server keeps writing that
//! form next to the binary snapshot and reads it at boot to rebuild the
//! palette. Everything that touches the legacy format goes through
//! [`LegacyGridShim`].

use crate::error::ServerResult;
use pixboard_storage::KvBackend;

/// Reads and writes the legacy JSON string grid under one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyGridShim {
    key: String,
}

impl LegacyGridShim {
    /// Creates a shim for `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Returns the storage key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Encodes a string grid as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(cells: &[String]) -> ServerResult<Vec<u8>> {
        Ok(serde_json::to_vec(cells).map_err(pixboard_storage::StorageError::from)?)
    }

    /// Decodes a JSON array of strings.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a JSON string array.
    pub fn decode(bytes: &[u8]) -> ServerResult<Vec<String>> {
        Ok(serde_json::from_slice(bytes).map_err(pixboard_storage::StorageError::from)?)
    }

    /// Writes `cells` under the shim key.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend write fails.
    pub fn save(&self, backend: &dyn KvBackend, cells: &[String]) -> ServerResult<()> {
        let bytes = Self::encode(cells)?;
        backend.set(&self.key, &bytes)?;
        Ok(())
    }

    /// Reads the string grid, if one was ever written.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails or the value is not a
    /// string array.
    pub fn load(&self, backend: &dyn KvBackend) -> ServerResult<Option<Vec<String>>> {
        match backend.get(&self.key)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}
