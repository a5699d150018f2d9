//! # Pixboard Storage
//!
//! Storage backends for the Pixboard canvas server.
//!
//! This crate provides the two external stores the server talks to:
//!
//! - A **key/value store with lists** ([`KvBackend`]), shaped like a small
//!   Redis: opaque byte values under string keys, plus FIFO lists that are
//!   appended at the tail and popped from the head. The grid snapshot, the
//!   legacy string grid and the durable write queue all live here.
//! - A **placement history store** ([`PlacementStore`]), the relational
//!   ledger of every accepted placement and each user's last-active time.
//!
//! ## Design Principles
//!
//! - Backends are opaque stores; they do not interpret grid bytes
//! - All methods take `&self`; implementations lock internally
//! - Must be `Send + Sync` so the server can call them from worker threads
//! - A failed call never leaves a half-applied batch behind
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] / [`InMemoryPlacementStore`] - For testing and ephemeral runs
//! - [`FileBackend`] / [`FilePlacementStore`] - For persistent storage in a data directory
//!
//! ## Example
//!
//! ```rust
//! use pixboard_storage::{KvBackend, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.list_push("queue", &[b"a".to_vec(), b"b".to_vec()]).unwrap();
//! let head = backend.list_pop("queue", 1).unwrap();
//! assert_eq!(head, vec![b"a".to_vec()]);
//! assert_eq!(backend.list_len("queue").unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod file_store;
mod memory;
mod record;
mod store;

pub use backend::{validate_key, KvBackend};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use file_store::FilePlacementStore;
pub use memory::InMemoryBackend;
pub use record::PlacementRecord;
pub use store::{InMemoryPlacementStore, PlacementStore};
