//! Grid engine.

use crate::error::{CoreError, CoreResult};
use crate::palette::ColorId;
use std::collections::BTreeSet;
use std::fmt;

/// Default chunk edge length for dirty tracking.
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Width and height of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridDimensions {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
}

impl GridDimensions {
    /// Creates dimensions, rejecting zero or unaddressable sizes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDimensions`] if either side is zero or
    /// `width * height` does not fit in memory addressing.
    pub fn new(width: u32, height: u32) -> CoreResult<Self> {
        let fits = (width as usize).checked_mul(height as usize).is_some();
        if width == 0 || height == 0 || !fits {
            return Err(CoreError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    /// Returns `width * height`.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns true if `(x, y)` lies inside the grid.
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Row-major index of `(x, y)`. Callers check bounds first.
    #[must_use]
    pub fn index_of(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

impl fmt::Display for GridDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Coordinates of a chunk, in chunk units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId {
    /// Chunk column.
    pub cx: u32,
    /// Chunk row.
    pub cy: u32,
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk:{},{}", self.cx, self.cy)
    }
}

/// The canonical canvas: a WxH buffer of palette ids.
///
/// Chunks are square groups of cells used only to answer "what changed
/// since the last drain" cheaply; storage is a flat row-major buffer.
///
/// # Example
///
/// ```rust
/// use pixboard_core::Grid;
///
/// let mut grid = Grid::new(4, 4).unwrap();
/// assert!(grid.set_pixel(1, 2, 7).unwrap());
/// assert!(!grid.set_pixel(1, 2, 7).unwrap());
/// assert_eq!(grid.get_pixel(1, 2).unwrap(), 7);
/// ```
#[derive(Debug, Clone)]
pub struct Grid {
    dims: GridDimensions,
    chunk_size: u32,
    cells: Vec<ColorId>,
    dirty: BTreeSet<ChunkId>,
}

impl Grid {
    /// Creates an all-zero grid with the default chunk size.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensions are invalid.
    pub fn new(width: u32, height: u32) -> CoreResult<Self> {
        Self::with_chunk_size(width, height, DEFAULT_CHUNK_SIZE)
    }

    /// Creates an all-zero grid with a custom chunk size.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensions or chunk size are invalid.
    pub fn with_chunk_size(width: u32, height: u32, chunk_size: u32) -> CoreResult<Self> {
        let dims = GridDimensions::new(width, height)?;
        if chunk_size == 0 {
            return Err(CoreError::InvalidChunkSize);
        }
        Ok(Self {
            dims,
            chunk_size,
            cells: vec![0; dims.cell_count()],
            dirty: BTreeSet::new(),
        })
    }

    /// Returns the grid dimensions.
    #[must_use]
    pub fn dimensions(&self) -> GridDimensions {
        self.dims
    }

    /// Returns the chunk edge length.
    #[must_use]
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Returns the number of chunks along x and y.
    #[must_use]
    pub fn chunk_layout(&self) -> (u32, u32) {
        (
            self.dims.width.div_ceil(self.chunk_size),
            self.dims.height.div_ceil(self.chunk_size),
        )
    }

    /// Returns the chunk containing `(x, y)`.
    #[must_use]
    pub fn chunk_of(&self, x: u32, y: u32) -> ChunkId {
        ChunkId {
            cx: x / self.chunk_size,
            cy: y / self.chunk_size,
        }
    }

    fn check_bounds(&self, x: u32, y: u32) -> CoreResult<usize> {
        if self.dims.contains(x, y) {
            Ok(self.dims.index_of(x, y))
        } else {
            Err(CoreError::OutOfBounds {
                x,
                y,
                width: self.dims.width,
                height: self.dims.height,
            })
        }
    }

    /// Sets a cell. Returns false without touching anything if the cell
    /// already holds `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OutOfBounds`] for coordinates outside the grid.
    pub fn set_pixel(&mut self, x: u32, y: u32, id: ColorId) -> CoreResult<bool> {
        let index = self.check_bounds(x, y)?;
        if self.cells[index] == id {
            return Ok(false);
        }
        self.cells[index] = id;
        let chunk = self.chunk_of(x, y);
        self.dirty.insert(chunk);
        Ok(true)
    }

    /// Reads a cell.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OutOfBounds`] for coordinates outside the grid.
    pub fn get_pixel(&self, x: u32, y: u32) -> CoreResult<ColorId> {
        let index = self.check_bounds(x, y)?;
        Ok(self.cells[index])
    }

    /// Returns the cells as a row-major slice.
    #[must_use]
    pub fn cells(&self) -> &[ColorId] {
        &self.cells
    }

    /// Returns an owned copy of every cell.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ColorId> {
        self.cells.clone()
    }

    /// Replaces every cell and marks every chunk dirty.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SnapshotLength`] if `buffer` is not exactly
    /// `width * height` bytes; the grid is unchanged in that case.
    pub fn restore(&mut self, buffer: &[ColorId]) -> CoreResult<()> {
        let expected = self.dims.cell_count();
        if buffer.len() != expected {
            return Err(CoreError::SnapshotLength {
                expected,
                actual: buffer.len(),
            });
        }

        self.cells.copy_from_slice(buffer);
        self.mark_all_dirty();
        Ok(())
    }

    fn mark_all_dirty(&mut self) {
        let (across, down) = self.chunk_layout();
        for cy in 0..down {
            for cx in 0..across {
                self.dirty.insert(ChunkId { cx, cy });
            }
        }
    }

    /// Returns the number of chunks currently dirty.
    #[must_use]
    pub fn dirty_chunk_count(&self) -> usize {
        self.dirty.len()
    }

    /// Returns and clears the dirty set, ordered by row then column.
    pub fn drain_dirty_chunks(&mut self) -> Vec<ChunkId> {
        let mut chunks: Vec<ChunkId> = std::mem::take(&mut self.dirty).into_iter().collect();
        chunks.sort_by_key(|c| (c.cy, c.cx));
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_grid_is_zeroed_and_clean() {
        let grid = Grid::new(10, 5).unwrap();
        assert_eq!(grid.cells().len(), 50);
        assert!(grid.cells().iter().all(|c| *c == 0));
        assert_eq!(grid.dirty_chunk_count(), 0);
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(matches!(
            Grid::new(0, 10),
            Err(CoreError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            Grid::with_chunk_size(10, 10, 0),
            Err(CoreError::InvalidChunkSize)
        ));
    }

    #[test]
    fn set_pixel_is_idempotent() {
        let mut grid = Grid::new(8, 8).unwrap();
        assert!(grid.set_pixel(3, 4, 2).unwrap());
        grid.drain_dirty_chunks();

        assert!(!grid.set_pixel(3, 4, 2).unwrap());
        assert_eq!(grid.dirty_chunk_count(), 0);
        assert_eq!(grid.get_pixel(3, 4).unwrap(), 2);
    }

    #[test]
    fn out_of_bounds_fails() {
        let mut grid = Grid::new(4, 3).unwrap();
        assert!(grid.set_pixel(4, 0, 1).is_err());
        assert!(grid.set_pixel(0, 3, 1).is_err());
        assert!(grid.get_pixel(u32::MAX, 0).is_err());
        assert!(grid.cells().iter().all(|c| *c == 0));
    }

    #[test]
    fn dirty_chunks_follow_pixels() {
        let mut grid = Grid::with_chunk_size(300, 300, 128).unwrap();
        grid.set_pixel(0, 0, 1).unwrap();
        grid.set_pixel(127, 127, 1).unwrap();
        grid.set_pixel(128, 0, 1).unwrap();
        grid.set_pixel(299, 299, 1).unwrap();

        let dirty = grid.drain_dirty_chunks();
        assert_eq!(
            dirty,
            vec![
                ChunkId { cx: 0, cy: 0 },
                ChunkId { cx: 1, cy: 0 },
                ChunkId { cx: 2, cy: 2 },
            ]
        );
        assert!(grid.drain_dirty_chunks().is_empty());
    }

    #[test]
    fn restore_marks_every_chunk() {
        let mut grid = Grid::with_chunk_size(300, 130, 128).unwrap();
        grid.restore(&vec![1; 300 * 130]).unwrap();
        assert_eq!(grid.chunk_layout(), (3, 2));
        assert_eq!(grid.dirty_chunk_count(), 6);
        assert_eq!(grid.get_pixel(299, 129).unwrap(), 1);
    }

    #[test]
    fn restore_wrong_length_leaves_grid_untouched() {
        let mut grid = Grid::new(4, 4).unwrap();
        grid.set_pixel(1, 1, 9).unwrap();
        grid.drain_dirty_chunks();
        let before = grid.snapshot();

        let err = grid.restore(&[0; 15]).unwrap_err();
        assert_eq!(
            err,
            CoreError::SnapshotLength {
                expected: 16,
                actual: 15
            }
        );
        assert_eq!(grid.snapshot(), before);
        assert_eq!(grid.dirty_chunk_count(), 0);
    }

    #[test]
    fn snapshot_is_independent() {
        let mut grid = Grid::new(2, 2).unwrap();
        let snap = grid.snapshot();
        grid.set_pixel(0, 0, 5).unwrap();
        assert_eq!(snap[0], 0);
    }

    proptest! {
        #[test]
        fn snapshot_restore_round_trip(
            writes in prop::collection::vec((0u32..20, 0u32..15, any::<u8>()), 0..64)
        ) {
            let mut grid = Grid::with_chunk_size(20, 15, 4).unwrap();
            for (x, y, id) in writes {
                grid.set_pixel(x, y, id).unwrap();
            }
            let snap = grid.snapshot();
            grid.restore(&snap).unwrap();
            prop_assert_eq!(grid.snapshot(), snap);
        }

        #[test]
        fn out_of_range_never_mutates(x in 20u32.., y in 15u32.., id in 1u8..) {
            let mut grid = Grid::new(20, 15).unwrap();
            prop_assert!(grid.set_pixel(x, y % 15, id).is_err());
            prop_assert!(grid.set_pixel(x % 20, y, id).is_err());
            prop_assert!(grid.get_pixel(x, y).is_err());
            prop_assert!(grid.cells().iter().all(|c| *c == 0));
            prop_assert_eq!(grid.dirty_chunk_count(), 0);
        }
    }
}
