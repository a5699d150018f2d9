//! Benchmark utilities.

use pixboard_core::Color;
use pixboard_storage::PlacementRecord;

/// Deterministic pseudo-random coordinates covering a `width x height` grid.
pub fn scattered_coords(count: usize, width: u32, height: u32) -> Vec<(u32, u32)> {
    // xorshift keeps runs reproducible without an RNG dependency
    let mut state = 0x2545_F491_4F6C_DD1Du64;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let x = (state % u64::from(width)) as u32;
            let y = ((state >> 32) % u64::from(height)) as u32;
            (x, y)
        })
        .collect()
}

/// `count` distinct colors, cycling through the 24-bit space.
pub fn distinct_colors(count: usize) -> Vec<Color> {
    (0..count)
        .filter_map(|i| Color::parse(&format!("#{:06X}", (i * 0x9E37) & 0xFF_FFFF)).ok())
        .collect()
}

/// Queue records for `count` placements.
pub fn placement_records(count: usize) -> Vec<PlacementRecord> {
    scattered_coords(count, 1000, 1000)
        .into_iter()
        .enumerate()
        .map(|(i, (x, y))| PlacementRecord {
            x,
            y,
            color: "#FF4500".into(),
            user_id: Some(format!("user-{}", i % 50)),
            is_admin: false,
            timestamp: 1_700_000_000_000 + i as u64,
        })
        .collect()
}
