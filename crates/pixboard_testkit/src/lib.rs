//! # Pixboard Testkit
//!
//! Test utilities for Pixboard.
//!
//! This crate provides:
//! - Fixtures: temporary data directories, backends that fail on demand
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pixboard_testkit::prelude::*;
//!
//! #[test]
//! fn survives_store_outage() {
//!     let store = FlakyStore::new();
//!     store.set_failing(true);
//!     // ... drive a flush
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
