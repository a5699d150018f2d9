//! # Pixboard Core
//!
//! In-memory canvas state for the Pixboard server.
//!
//! This crate provides:
//! - [`Color`] - validated literal color values
//! - [`Palette`] - append-only mapping between colors and 1-byte ids
//! - [`Grid`] - the canonical WxH id buffer with chunk-level dirty tracking
//!
//! This is a pure crate with no I/O. The server owns one `Grid` and one
//! `Palette` on a single task, so neither type does any locking.
//!
//! ## Key Invariants
//!
//! - Palette id 0 is always the default color
//! - A palette id, once assigned, never changes until the palette is reset
//! - Grid dimensions never change after construction
//! - `restore` with a wrong-length buffer leaves the grid untouched

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod color;
mod error;
mod grid;
mod palette;

pub use color::Color;
pub use error::{CoreError, CoreResult};
pub use grid::{ChunkId, Grid, GridDimensions, DEFAULT_CHUNK_SIZE};
pub use palette::{ColorId, Palette, PALETTE_CAPACITY};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
