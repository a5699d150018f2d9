//! Color palette encoder.

use crate::color::Color;
use std::collections::HashMap;

/// Compact color identifier stored in each grid cell.
pub type ColorId = u8;

/// Maximum number of palette entries (the 1-byte id space).
pub const PALETTE_CAPACITY: usize = 256;

/// Append-only mapping between colors and 1-byte ids.
///
/// Id 0 is always the default color. New colors get the next free id the
/// first time they are seen. Once all 256 ids are taken, unseen colors
/// alias to id 0 and therefore render as the default color. This is the
/// board's documented degraded mode, not an error.
///
/// # Example
///
/// ```rust
/// use pixboard_core::{Color, Palette};
///
/// let white = Color::parse("#FFFFFF").unwrap();
/// let red = Color::parse("#FF0000").unwrap();
///
/// let mut palette = Palette::new(white.clone());
/// assert_eq!(palette.id_for(&white), 0);
/// assert_eq!(palette.id_for(&red), 1);
/// assert_eq!(palette.color_for(1), &red);
/// ```
#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<Color>,
    ids: HashMap<Color, ColorId>,
}

impl Palette {
    /// Creates a palette holding only `default` at id 0.
    #[must_use]
    pub fn new(default: Color) -> Self {
        let mut ids = HashMap::new();
        ids.insert(default.clone(), 0);
        Self {
            colors: vec![default],
            ids,
        }
    }

    /// Rebuilds a palette from a row-major grid of color strings.
    ///
    /// Colors are registered in first-seen order, so the same input always
    /// yields the same ids. Strings that are not valid colors map to id 0.
    /// Returns the palette and the grid of ids.
    #[must_use]
    pub fn from_strings<S: AsRef<str>>(default: Color, cells: &[S]) -> (Self, Vec<ColorId>) {
        let mut palette = Self::new(default);
        let ids = cells
            .iter()
            .map(|cell| match Color::parse(cell.as_ref()) {
                Ok(color) => palette.id_for(&color),
                Err(_) => 0,
            })
            .collect();
        (palette, ids)
    }

    /// Returns the id for `color`, registering it if unseen.
    ///
    /// Returns 0 for unseen colors once the palette is full.
    pub fn id_for(&mut self, color: &Color) -> ColorId {
        if let Some(id) = self.ids.get(color) {
            return *id;
        }
        if self.is_full() {
            return 0;
        }

        // len < 256 here, so the new id fits in a u8
        let id = self.colors.len() as ColorId;
        self.colors.push(color.clone());
        self.ids.insert(color.clone(), id);
        id
    }

    /// Returns the id for `color` without registering it.
    #[must_use]
    pub fn lookup(&self, color: &Color) -> Option<ColorId> {
        self.ids.get(color).copied()
    }

    /// Returns the color for `id`, or the default for unregistered ids.
    #[must_use]
    pub fn color_for(&self, id: ColorId) -> &Color {
        self.colors
            .get(usize::from(id))
            .unwrap_or_else(|| self.default_color())
    }

    /// Returns true if `id` has been assigned.
    #[must_use]
    pub fn is_registered(&self, id: ColorId) -> bool {
        usize::from(id) < self.colors.len()
    }

    /// Returns the default color (id 0).
    #[must_use]
    pub fn default_color(&self) -> &Color {
        &self.colors[0]
    }

    /// Returns the number of registered colors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always false: the default color is always registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Returns true once every id is taken.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.colors.len() >= PALETTE_CAPACITY
    }

    /// Forgets every color and starts over with `default` at id 0.
    pub fn reset(&mut self, default: Color) {
        *self = Self::new(default);
    }

    /// Expands a grid of ids into a row-major grid of color strings.
    #[must_use]
    pub fn to_strings(&self, ids: &[ColorId]) -> Vec<String> {
        ids.iter()
            .map(|id| self.color_for(*id).as_str().to_string())
            .collect()
    }

    /// Iterates registered colors in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ColorId, &Color)> {
        self.colors
            .iter()
            .enumerate()
            .map(|(i, color)| (i as ColorId, color))
    }
}
