//! Queue command implementation.

use super::{env_config, kv_path};
use pixboard_server::DurableQueue;
use pixboard_storage::FileBackend;
use std::path::Path;
use std::sync::Arc;

/// Prints the durable queue depth. Works while a server owns the data
/// directory.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let kv = kv_path(path);
    if !kv.exists() {
        return Err(format!("No data directory found at {:?}", path).into());
    }

    let config = env_config()?;
    let queue = DurableQueue::new(Arc::new(FileBackend::open_read_only(&kv)?), config.queue_key);
    println!("{} placements queued under {}", queue.len()?, queue.key());
    Ok(())
}
