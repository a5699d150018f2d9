//! Error types for Pixboard core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in grid and palette operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Pixel coordinates outside the grid.
    #[error("pixel ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        /// Requested column.
        x: u32,
        /// Requested row.
        y: u32,
        /// Grid width.
        width: u32,
        /// Grid height.
        height: u32,
    },

    /// A snapshot buffer does not match the grid size.
    #[error("snapshot length mismatch: expected {expected} bytes, got {actual}")]
    SnapshotLength {
        /// Expected length (width * height).
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },

    /// Grid dimensions are zero or too large to address.
    #[error("invalid grid dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Chunk size of zero.
    #[error("chunk size must be positive")]
    InvalidChunkSize,

    /// A color string that is not a hex color.
    #[error("invalid color: {0:?}")]
    InvalidColor(String),
}
