//! CLI command implementations.

pub mod inspect;
pub mod publish;
pub mod purge;
pub mod queue;
pub mod serve;

use pixboard_server::{ConfigError, ServerConfig};
use pixboard_storage::{FileBackend, FilePlacementStore, StorageResult};
use std::path::{Path, PathBuf};

/// Directory of the key/value backend inside a data directory.
pub const KV_DIR: &str = "kv";

/// Placement history journal inside a data directory.
pub const HISTORY_FILE: &str = "history.jsonl";

/// Returns the key/value backend path under `root`.
pub fn kv_path(root: &Path) -> PathBuf {
    root.join(KV_DIR)
}

/// Returns the history journal path under `root`.
pub fn history_path(root: &Path) -> PathBuf {
    root.join(HISTORY_FILE)
}

/// Opens both file backends of a data directory, creating it if needed.
pub fn open_data_dir(root: &Path) -> StorageResult<(FileBackend, FilePlacementStore)> {
    std::fs::create_dir_all(root)?;
    Ok((
        FileBackend::open(&kv_path(root))?,
        FilePlacementStore::open(&history_path(root))?,
    ))
}

/// Loads the server configuration from `PIXBOARD_*` variables.
pub fn env_config() -> Result<ServerConfig, ConfigError> {
    ServerConfig::from_env()
}
