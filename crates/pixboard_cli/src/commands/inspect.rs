//! Inspect command implementation.

use super::{env_config, history_path, kv_path};
use pixboard_core::{GridDimensions, Palette};
use pixboard_server::{DurableQueue, GridStore, ServerConfig, ServerError};
use pixboard_storage::{FileBackend, FilePlacementStore, KvBackend, PlacementStore};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// Configured grid width.
    pub width: u32,
    /// Configured grid height.
    pub height: u32,
    /// Binary snapshot length, if one is stored.
    pub snapshot_bytes: Option<usize>,
    /// Whether the snapshot fits the configured dimensions.
    pub snapshot_matches: bool,
    /// Distinct palette ids used by the snapshot.
    pub snapshot_ids: usize,
    /// Cells not holding the default color.
    pub painted_cells: usize,
    /// Legacy string grid length, if one is stored.
    pub legacy_cells: Option<usize>,
    /// Palette size rebuilt from the legacy grid.
    pub legacy_colors: Option<usize>,
    /// Placements waiting in the durable queue.
    pub queue_len: u64,
    /// Placements in the history journal.
    pub history_placements: Option<u64>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = env_config()?;
    let result = inspect(path, &config)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Gathers statistics about a data directory without locking it.
pub fn inspect(path: &Path, config: &ServerConfig) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let kv_dir = kv_path(path);
    if !kv_dir.exists() {
        return Err(format!("No data directory found at {:?}", path).into());
    }

    let kv: Arc<dyn KvBackend> = Arc::new(FileBackend::open_read_only(&kv_dir)?);
    let dims = GridDimensions::new(config.width, config.height)?;
    let grids = GridStore::new(Arc::clone(&kv), config.grid_key.clone())
        .with_legacy_key(config.legacy_grid_key.clone());

    let mut result = InspectResult {
        path: path.display().to_string(),
        width: config.width,
        height: config.height,
        snapshot_bytes: None,
        snapshot_matches: false,
        snapshot_ids: 0,
        painted_cells: 0,
        legacy_cells: None,
        legacy_colors: None,
        queue_len: 0,
        history_placements: None,
    };

    match grids.load(dims) {
        Ok(Some(cells)) => {
            result.snapshot_bytes = Some(cells.len());
            result.snapshot_matches = true;
            result.snapshot_ids = cells.iter().collect::<BTreeSet<_>>().len();
            result.painted_cells = cells.iter().filter(|&&id| id != 0).count();
        }
        Ok(None) => {}
        Err(ServerError::SnapshotMismatch { actual, .. }) => {
            result.snapshot_bytes = Some(actual);
        }
        Err(err) => return Err(err.into()),
    }

    if let Some(cells) = grids.load_legacy()? {
        let (palette, _) = Palette::from_strings(config.default_color()?, &cells);
        result.legacy_cells = Some(cells.len());
        result.legacy_colors = Some(palette.len());
    }

    result.queue_len = DurableQueue::new(kv, config.queue_key.clone()).len()?;

    let history = history_path(path);
    if history.exists() {
        let store = FilePlacementStore::open_read_only(&history)?;
        result.history_placements = Some(store.count_placements()?);
    }

    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("Pixboard Data Directory: {}", result.path);
    println!("═══════════════════════════════════════════");
    println!();
    println!("Canvas:            {}x{}", result.width, result.height);
    match result.snapshot_bytes {
        Some(bytes) if result.snapshot_matches => {
            println!("Snapshot:          {} bytes", bytes);
            println!("  Palette ids:     {}", result.snapshot_ids);
            println!("  Painted cells:   {}", result.painted_cells);
        }
        Some(bytes) => println!("Snapshot:          {} bytes (size mismatch!)", bytes),
        None => println!("Snapshot:          none"),
    }
    match (result.legacy_cells, result.legacy_colors) {
        (Some(cells), Some(colors)) => {
            println!("Legacy grid:       {} cells, {} colors", cells, colors)
        }
        _ => println!("Legacy grid:       none"),
    }
    println!("Queued placements: {}", result.queue_len);
    match result.history_placements {
        Some(count) => println!("History:           {} placements", count),
        None => println!("History:           none"),
    }
}
