//! Purge-history command implementation.

use super::history_path;
use pixboard_storage::{FilePlacementStore, PlacementStore};
use std::path::Path;

/// Deletes every stored placement.
///
/// The history journal is locked by a running server, so this fails
/// instead of racing with it.
pub fn run(path: &Path, confirmed: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !confirmed {
        return Err("Refusing to purge history without --yes".into());
    }

    let history = history_path(path);
    if !history.exists() {
        return Err(format!("No placement history found at {:?}", history).into());
    }

    let store = FilePlacementStore::open(&history)?;
    let removed = store.delete_all_placements()?;
    println!("Removed {removed} placements");
    Ok(())
}
