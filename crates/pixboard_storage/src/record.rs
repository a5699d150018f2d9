//! Placement records shared by the durable queue and the history store.

use crate::error::StorageResult;
use serde::{Deserialize, Serialize};

/// One accepted placement, as stored in the durable queue and history.
///
/// The color is kept as its literal value rather than a palette id so the
/// stored history stays readable across palette resets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRecord {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Literal color value, e.g. `#FF0000`.
    pub color: String,
    /// Identity of the placing user, if any.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Whether the placement came from a privileged caller.
    #[serde(default)]
    pub is_admin: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl PlacementRecord {
    /// Encodes the record as a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_bytes(&self) -> StorageResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a record from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid record.
    pub fn from_json_bytes(bytes: &[u8]) -> StorageResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
