//! Property-based test generators using proptest.
//!
//! Provides strategies for generating canvas inputs, both valid and
//! deliberately hostile.

use pixboard_core::{Color, GridDimensions};
use pixboard_protocol::{ColorField, PlacePixel};
use pixboard_storage::PlacementRecord;
use proptest::prelude::*;

/// Strategy for literal colors in `#RRGGBB` form.
pub fn color_strategy() -> impl Strategy<Value = String> {
    any::<[u8; 3]>().prop_map(|[r, g, b]| format!("#{r:02X}{g:02X}{b:02X}"))
}

/// Strategy for parsed colors.
pub fn parsed_color_strategy() -> impl Strategy<Value = Color> {
    color_strategy().prop_filter_map("valid color", |raw| Color::parse(&raw).ok())
}

/// Strategy for grid dimensions small enough for exhaustive checks.
pub fn dimensions_strategy() -> impl Strategy<Value = GridDimensions> {
    (1u32..64, 1u32..64).prop_filter_map("valid dimensions", |(w, h)| {
        GridDimensions::new(w, h).ok()
    })
}

/// Strategy for in-bounds placements on a grid.
pub fn placement_strategy(dims: GridDimensions) -> impl Strategy<Value = PlacePixel> {
    (0..dims.width, 0..dims.height, color_strategy())
        .prop_map(|(x, y, color)| PlacePixel::new(x, y, color))
}

/// Strategy for coordinates that must be rejected on a grid.
///
/// Mixes negative, too-large, fractional and non-finite values.
pub fn hostile_coordinate_strategy(dims: GridDimensions) -> impl Strategy<Value = (f64, f64)> {
    let width = f64::from(dims.width);
    let height = f64::from(dims.height);
    prop_oneof![
        (-1.0e9f64..-0.5, 0.0..height).prop_map(|(x, y)| (x.floor(), y.floor())),
        (0.0..width, -1.0e9f64..-0.5).prop_map(|(x, y)| (x.floor(), y.floor())),
        (width..width + 1.0e6, 0.0..height).prop_map(|(x, y)| (x.floor(), y.floor())),
        (0.0..width, height..height + 1.0e6).prop_map(|(x, y)| (x.floor(), y.floor())),
        (0.0..width, 0.0..height).prop_map(|(x, y)| (x.floor() + 0.5, y.floor())),
        Just((f64::NAN, 0.0)),
        Just((0.0, f64::INFINITY)),
        Just((f64::NEG_INFINITY, f64::NAN)),
    ]
}

/// Strategy for placements with hostile coordinates.
pub fn hostile_placement_strategy(dims: GridDimensions) -> impl Strategy<Value = PlacePixel> {
    (hostile_coordinate_strategy(dims), color_strategy()).prop_map(|((x, y), color)| PlacePixel {
        x,
        y,
        color: ColorField::Value(color),
        user_id: None,
        is_admin: None,
    })
}

/// Strategy for optional user ids.
pub fn user_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::string::string_regex("u[0-9]{1,4}").expect("Invalid regex"))
}

/// Strategy for queue records.
pub fn placement_record_strategy() -> impl Strategy<Value = PlacementRecord> {
    (
        0u32..1024,
        0u32..1024,
        color_strategy(),
        user_strategy(),
        any::<bool>(),
        0u64..4_000_000_000_000,
    )
        .prop_map(|(x, y, color, user_id, is_admin, timestamp)| PlacementRecord {
            x,
            y,
            color,
            user_id,
            is_admin,
            timestamp,
        })
}
