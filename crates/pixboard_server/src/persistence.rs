//! Grid snapshot persistence.
//!
//! [`GridStore`] loads and saves the binary snapshot (one byte per cell)
//! and, when enabled, the legacy string grid. [`SnapshotWriter`] is the
//! single task that performs saves so they land in submission order; a
//! backlog of checkpoints collapses to the newest one.

use crate::error::{ServerError, ServerResult};
use crate::legacy::LegacyGridShim;
use pixboard_core::{Color, ColorId, GridDimensions, Palette};
use pixboard_storage::KvBackend;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything needed to persist the canvas at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCheckpoint {
    /// Binary snapshot, one palette id per cell.
    pub cells: Vec<ColorId>,
    /// Literal colors for the legacy key, when the dual write is enabled.
    pub legacy: Option<Vec<String>>,
}

/// Where the boot-time canvas came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    /// Rebuilt from the legacy string grid, palette included.
    Legacy,
    /// Loaded from the binary snapshot with a default-only palette.
    Snapshot,
    /// Nothing usable was stored.
    Empty,
}

impl fmt::Display for RecoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoverySource::Legacy => "legacy",
            RecoverySource::Snapshot => "snapshot",
            RecoverySource::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// Canvas state read back at boot.
#[derive(Debug, Clone)]
pub struct RecoveredCanvas {
    /// Cells, exactly `width * height` bytes.
    pub cells: Vec<ColorId>,
    /// Palette matching `cells`.
    pub palette: Palette,
    /// Origin of the data.
    pub source: RecoverySource,
}

/// Persistence adapter over a key/value backend.
pub struct GridStore {
    backend: Arc<dyn KvBackend>,
    grid_key: String,
    legacy: Option<LegacyGridShim>,
}

impl GridStore {
    /// Creates an adapter writing the snapshot under `grid_key`.
    pub fn new(backend: Arc<dyn KvBackend>, grid_key: impl Into<String>) -> Self {
        Self {
            backend,
            grid_key: grid_key.into(),
            legacy: None,
        }
    }

    /// Enables the legacy dual write under `key`.
    pub fn with_legacy_key(mut self, key: Option<String>) -> Self {
        self.legacy = key.map(LegacyGridShim::new);
        self
    }

    /// Returns the snapshot key.
    pub fn grid_key(&self) -> &str {
        &self.grid_key
    }

    /// Returns true if checkpoints should carry the legacy string grid.
    pub fn writes_legacy(&self) -> bool {
        self.legacy.is_some()
    }

    /// Writes the binary snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn save(&self, cells: &[ColorId]) -> ServerResult<()> {
        self.backend.set(&self.grid_key, cells)?;
        Ok(())
    }

    /// Writes a checkpoint: the binary snapshot, then the legacy grid.
    ///
    /// Both writes are attempted; the first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if either write fails.
    pub fn save_checkpoint(&self, checkpoint: &GridCheckpoint) -> ServerResult<()> {
        let binary = self.save(&checkpoint.cells);
        if let Err(err) = &binary {
            warn!(key = %self.grid_key, bytes = checkpoint.cells.len(), error = %err, "snapshot save failed");
        }

        let legacy = match (&self.legacy, &checkpoint.legacy) {
            (Some(shim), Some(cells)) => {
                let result = shim.save(self.backend.as_ref(), cells);
                if let Err(err) = &result {
                    warn!(key = %shim.key(), count = cells.len(), error = %err, "legacy grid save failed");
                }
                result
            }
            _ => Ok(()),
        };

        binary.and(legacy)
    }

    /// Reads the binary snapshot.
    ///
    /// Returns `None` if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::SnapshotMismatch`] if the stored length is not
    /// `width * height`, or a storage error if the read fails.
    pub fn load(&self, dims: GridDimensions) -> ServerResult<Option<Vec<ColorId>>> {
        let Some(bytes) = self.backend.get(&self.grid_key)? else {
            return Ok(None);
        };

        let expected = dims.cell_count();
        if bytes.len() != expected {
            return Err(ServerError::SnapshotMismatch {
                key: self.grid_key.clone(),
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Some(bytes))
    }

    /// Reads the legacy string grid, if enabled and present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or decode fails.
    pub fn load_legacy(&self) -> ServerResult<Option<Vec<String>>> {
        match &self.legacy {
            Some(shim) => shim.load(self.backend.as_ref()),
            None => Ok(None),
        }
    }

    /// Rebuilds the canvas at boot.
    ///
    /// A legacy grid of the right size wins because it carries the colors
    /// themselves. Otherwise the binary snapshot is used with a palette
    /// holding only the default. Unreadable or mismatched data is logged
    /// and skipped; the result is never an error.
    pub fn recover(&self, dims: GridDimensions, default: &Color) -> RecoveredCanvas {
        match self.load_legacy() {
            Ok(Some(strings)) if strings.len() == dims.cell_count() => {
                let (palette, cells) = Palette::from_strings(default.clone(), &strings);
                info!(colors = palette.len(), "recovered canvas from legacy grid");
                return RecoveredCanvas {
                    cells,
                    palette,
                    source: RecoverySource::Legacy,
                };
            }
            Ok(Some(strings)) => {
                warn!(
                    expected = dims.cell_count(),
                    actual = strings.len(),
                    "legacy grid has wrong size, ignoring"
                );
            }
            Ok(None) => debug!("no legacy grid stored"),
            Err(err) => warn!(error = %err, "cannot read legacy grid"),
        }

        let palette = Palette::new(default.clone());
        match self.load(dims) {
            Ok(Some(cells)) => {
                info!(key = %self.grid_key, "recovered canvas from snapshot");
                RecoveredCanvas {
                    cells,
                    palette,
                    source: RecoverySource::Snapshot,
                }
            }
            Ok(None) => RecoveredCanvas {
                cells: vec![0; dims.cell_count()],
                palette,
                source: RecoverySource::Empty,
            },
            Err(err) => {
                warn!(error = %err, "cannot load snapshot, starting with an empty canvas");
                RecoveredCanvas {
                    cells: vec![0; dims.cell_count()],
                    palette,
                    source: RecoverySource::Empty,
                }
            }
        }
    }
}

impl fmt::Debug for GridStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridStore")
            .field("grid_key", &self.grid_key)
            .field("legacy", &self.legacy)
            .finish_non_exhaustive()
    }
}

/// Handle to the task that writes checkpoints in order.
#[derive(Debug)]
pub struct SnapshotWriter {
    tx: mpsc::UnboundedSender<GridCheckpoint>,
    task: JoinHandle<()>,
}

impl SnapshotWriter {
    /// Spawns the writer task. Must be called within a Tokio runtime.
    pub fn spawn(store: Arc<GridStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_checkpoints(store, rx));
        Self { tx, task }
    }

    /// Queues a checkpoint for saving.
    pub fn submit(&self, checkpoint: GridCheckpoint) {
        if self.tx.send(checkpoint).is_err() {
            warn!("snapshot writer stopped, checkpoint dropped");
        }
    }

    /// Waits for every queued checkpoint to be written and stops the task.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(err) = self.task.await {
            warn!(error = %err, "snapshot writer task failed");
        }
    }
}

async fn write_checkpoints(store: Arc<GridStore>, mut rx: mpsc::UnboundedReceiver<GridCheckpoint>) {
    while let Some(mut checkpoint) = rx.recv().await {
        let mut skipped = 0usize;
        while let Ok(newer) = rx.try_recv() {
            checkpoint = newer;
            skipped += 1;
        }
        if skipped > 0 {
            debug!(skipped, "coalesced snapshot saves");
        }

        let store = Arc::clone(&store);
        let bytes = checkpoint.cells.len();
        match tokio::task::spawn_blocking(move || store.save_checkpoint(&checkpoint)).await {
            Ok(Ok(())) => debug!(bytes, "snapshot saved"),
            // already logged with its key
            Ok(Err(_)) => {}
            Err(err) => warn!(error = %err, "snapshot save task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixboard_storage::InMemoryBackend;

    fn white() -> Color {
        Color::parse("#FFFFFF").unwrap()
    }

    fn store(backend: &Arc<InMemoryBackend>) -> GridStore {
        GridStore::new(Arc::clone(backend) as Arc<dyn KvBackend>, "grid")
            .with_legacy_key(Some("grid:legacy".into()))
    }

    #[test]
    fn load_missing_is_none() {
        let backend = Arc::new(InMemoryBackend::new());
        let dims = GridDimensions::new(2, 2).unwrap();
        assert_eq!(store(&backend).load(dims).unwrap(), None);
    }

    #[test]
    fn load_rejects_wrong_length() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set("grid", &[0, 1, 2]).unwrap();
        let dims = GridDimensions::new(2, 2).unwrap();

        let err = store(&backend).load(dims).unwrap_err();
        assert!(matches!(
            err,
            ServerError::SnapshotMismatch { expected: 4, actual: 3, .. }
        ));
    }

    #[test]
    fn checkpoint_writes_both_keys() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store(&backend);
        store
            .save_checkpoint(&GridCheckpoint {
                cells: vec![0, 1],
                legacy: Some(vec!["#FFFFFF".into(), "#FF0000".into()]),
            })
            .unwrap();

        assert_eq!(backend.get("grid").unwrap(), Some(vec![0, 1]));
        assert_eq!(
            store.load_legacy().unwrap(),
            Some(vec!["#FFFFFF".to_string(), "#FF0000".to_string()])
        );
    }

    #[test]
    fn recover_prefers_legacy_grid() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = store(&backend);
        store
            .save_checkpoint(&GridCheckpoint {
                cells: vec![0, 0, 0, 0],
                legacy: Some(
                    ["#FFFFFF", "#00FF00", "#0000FF", "#00FF00"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
            })
            .unwrap();

        let dims = GridDimensions::new(2, 2).unwrap();
        let recovered = store.recover(dims, &white());
        assert_eq!(recovered.source, RecoverySource::Legacy);
        assert_eq!(recovered.cells, vec![0, 1, 2, 1]);
        assert_eq!(recovered.palette.color_for(2).as_str(), "#0000FF");
    }

    #[test]
    fn recover_falls_back_to_snapshot() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set("grid", &[0, 3, 0, 0]).unwrap();
        backend.set("grid:legacy", b"[\"#FFFFFF\"]").unwrap();

        let dims = GridDimensions::new(2, 2).unwrap();
        let recovered = store(&backend).recover(dims, &white());
        assert_eq!(recovered.source, RecoverySource::Snapshot);
        assert_eq!(recovered.cells, vec![0, 3, 0, 0]);
        assert_eq!(recovered.palette.len(), 1);
    }

    #[test]
    fn recover_mismatch_starts_empty() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set("grid", &[1; 9]).unwrap();

        let dims = GridDimensions::new(2, 2).unwrap();
        let recovered = store(&backend).recover(dims, &white());
        assert_eq!(recovered.source, RecoverySource::Empty);
        assert_eq!(recovered.cells, vec![0; 4]);
    }

    #[tokio::test]
    async fn writer_keeps_last_checkpoint() {
        let backend = Arc::new(InMemoryBackend::new());
        let writer = SnapshotWriter::spawn(Arc::new(store(&backend)));

        for fill in 1..=5u8 {
            writer.submit(GridCheckpoint {
                cells: vec![fill; 4],
                legacy: None,
            });
        }
        writer.close().await;

        assert_eq!(backend.get("grid").unwrap(), Some(vec![5; 4]));
    }
}
