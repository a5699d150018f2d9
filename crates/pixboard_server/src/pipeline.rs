//! Placement validation and canvas state.
//!
//! A `placePixel` frame goes through [`validate`] and then
//! [`Canvas::apply`]. Validation failures are [`Rejection`]s, which the
//! hub logs at debug level and otherwise ignores.

use crate::persistence::GridCheckpoint;
use pixboard_core::{Color, CoreResult, Grid, GridDimensions, Palette};
use pixboard_protocol::{CanvasCleared, ColorField, InitPayload, PixelUpdate, PlacePixel};
use pixboard_storage::PlacementRecord;
use thiserror::Error;

/// A placement that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Requested color.
    pub color: Color,
    /// Placing user, if known.
    pub user_id: Option<String>,
    /// Whether the caller claimed privileged status.
    pub is_admin: bool,
}

/// Why a placement was dropped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    /// A coordinate is NaN or infinite.
    #[error("non-finite coordinate ({x}, {y})")]
    NonFinite {
        /// Raw column.
        x: f64,
        /// Raw row.
        y: f64,
    },

    /// A coordinate has a fractional part.
    #[error("non-integral coordinate ({x}, {y})")]
    NotIntegral {
        /// Raw column.
        x: f64,
        /// Raw row.
        y: f64,
    },

    /// The cell lies outside the grid.
    #[error("({x}, {y}) is outside the {dims} grid")]
    OutOfBounds {
        /// Raw column.
        x: f64,
        /// Raw row.
        y: f64,
        /// Grid dimensions.
        dims: GridDimensions,
    },

    /// The color string is not a hex color.
    #[error("invalid color {0:?}")]
    InvalidColor(String),

    /// The palette id has not been assigned.
    #[error("unknown palette id {0}")]
    UnknownColorId(u64),

    /// Anonymous placements are disabled.
    #[error("anonymous placement refused")]
    Anonymous,
}

/// Checks a `placePixel` request against the grid and palette.
///
/// A request without `userId` is attributed to `fallback_user`, the
/// identity the connection authenticated with.
///
/// # Errors
///
/// Returns the first [`Rejection`] that applies.
pub fn validate(
    request: PlacePixel,
    dims: GridDimensions,
    palette: &Palette,
    fallback_user: Option<&str>,
    allow_anonymous: bool,
) -> Result<Placement, Rejection> {
    let (x, y) = (request.x, request.y);
    if !x.is_finite() || !y.is_finite() {
        return Err(Rejection::NonFinite { x, y });
    }
    if x.fract() != 0.0 || y.fract() != 0.0 {
        return Err(Rejection::NotIntegral { x, y });
    }
    if x < 0.0 || y < 0.0 || x >= f64::from(dims.width) || y >= f64::from(dims.height) {
        return Err(Rejection::OutOfBounds { x, y, dims });
    }

    let color = match request.color {
        ColorField::Value(raw) => Color::parse(&raw).map_err(|_| Rejection::InvalidColor(raw))?,
        ColorField::Id(id) => match u8::try_from(id) {
            Ok(small) if palette.is_registered(small) => palette.color_for(small).clone(),
            _ => return Err(Rejection::UnknownColorId(id)),
        },
    };

    let user_id = request
        .user_id
        .filter(|user| !user.is_empty())
        .or_else(|| fallback_user.map(str::to_string));
    if user_id.is_none() && !allow_anonymous {
        return Err(Rejection::Anonymous);
    }

    // bounds were checked against u32 dimensions above
    Ok(Placement {
        x: x as u32,
        y: y as u32,
        color,
        user_id,
        is_admin: request.is_admin.unwrap_or(false),
    })
}

/// What an applied placement produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Frame to broadcast.
    pub update: PixelUpdate,
    /// Record to enqueue for the history store.
    pub record: PlacementRecord,
}

/// The canonical canvas: grid, palette and placement counter.
#[derive(Debug, Clone)]
pub struct Canvas {
    grid: Grid,
    palette: Palette,
    total_pixels: u64,
}

impl Canvas {
    /// Assembles a canvas from recovered parts.
    pub fn new(grid: Grid, palette: Palette, total_pixels: u64) -> Self {
        Self {
            grid,
            palette,
            total_pixels,
        }
    }

    /// Returns the grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Returns the palette.
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Returns the number of accepted placements.
    pub fn total_pixels(&self) -> u64 {
        self.total_pixels
    }

    /// Returns the grid dimensions.
    pub fn dimensions(&self) -> GridDimensions {
        self.grid.dimensions()
    }

    /// Applies a validated placement at time `now`.
    ///
    /// Returns `None` when the cell already held the color; nothing is
    /// counted, queued or broadcast in that case. The broadcast carries the
    /// color the cell actually resolves to, which is the default when the
    /// palette is saturated. The record keeps the requested color.
    ///
    /// # Errors
    ///
    /// Returns an error only if the coordinates are out of bounds, which
    /// [`validate`] already excludes.
    pub fn apply(&mut self, placement: &Placement, now: u64) -> CoreResult<Option<Applied>> {
        let id = self.palette.id_for(&placement.color);
        if !self.grid.set_pixel(placement.x, placement.y, id)? {
            return Ok(None);
        }
        self.total_pixels += 1;

        let update = PixelUpdate {
            x: placement.x,
            y: placement.y,
            color: self.palette.color_for(id).to_string(),
            user_id: placement.user_id.clone(),
            timestamp: now,
            total_pixels: self.total_pixels,
        };
        let record = PlacementRecord {
            x: placement.x,
            y: placement.y,
            color: placement.color.to_string(),
            user_id: placement.user_id.clone(),
            is_admin: placement.is_admin,
            timestamp: now,
        };
        Ok(Some(Applied { update, record }))
    }

    /// Renders the grid as literal colors.
    pub fn render(&self) -> Vec<String> {
        self.palette.to_strings(self.grid.cells())
    }

    /// Builds the `init` payload.
    pub fn init_payload(&self, now: u64) -> InitPayload {
        let dims = self.dimensions();
        InitPayload {
            width: dims.width,
            height: dims.height,
            grid: self.render(),
            total_pixels: self.total_pixels,
            timestamp: now,
        }
    }

    /// Wipes the canvas: counter to zero, palette reset to `default`, every
    /// cell to id 0.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the blank buffer always has the right size.
    pub fn wipe(
        &mut self,
        default: Color,
        cleared_by: Option<String>,
        timestamp: u64,
    ) -> CoreResult<CanvasCleared> {
        let dims = self.dimensions();
        self.total_pixels = 0;
        self.palette.reset(default);
        self.grid.restore(&vec![0; dims.cell_count()])?;

        Ok(CanvasCleared {
            timestamp,
            width: dims.width,
            height: dims.height,
            grid: self.render(),
            total_pixels: 0,
            cleared_by,
        })
    }

    /// Clears dirty tracking, returning how many chunks changed.
    pub fn take_dirty(&mut self) -> usize {
        self.grid.drain_dirty_chunks().len()
    }

    /// Returns the number of chunks changed since the last checkpoint.
    pub fn dirty_chunks(&self) -> usize {
        self.grid.dirty_chunk_count()
    }

    /// Captures the state to persist.
    pub fn checkpoint(&self, with_legacy: bool) -> GridCheckpoint {
        GridCheckpoint {
            cells: self.grid.snapshot(),
            legacy: with_legacy.then(|| self.render()),
        }
    }
}
