//! File-backed placement history.
//!
//! History is an append-only JSON-lines log. Each committed batch is a run
//! of `placement` and `touch` entries followed by a `commit` marker, all
//! written with one `write_all` and synced before the call returns. On open
//! the log is replayed; entries after the last `commit` (a torn batch) are
//! discarded and cut off before the next append.
//!
//! The writer holds an advisory lock on a `<history>.lock` sidecar rather
//! than on the log itself, so a purge can replace the log by rename.

use crate::error::{StorageError, StorageResult};
use crate::file::write_atomic;
use crate::record::PlacementRecord;
use crate::store::PlacementStore;
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum HistoryEntry {
    Placement(PlacementRecord),
    Touch { user: String, at: u64 },
    Commit { entries: u64 },
}

#[derive(Debug, Default)]
struct Replayed {
    placements: u64,
    last_active: HashMap<String, u64>,
    valid_len: u64,
}

fn replay(bytes: &[u8]) -> Replayed {
    let mut state = Replayed::default();
    let mut pending_placements = 0u64;
    let mut pending_touches: Vec<(String, u64)> = Vec::new();
    let mut pending_entries = 0u64;
    let mut offset = 0usize;

    for line in bytes.split_inclusive(|b| *b == b'\n') {
        if !line.ends_with(b"\n") {
            break;
        }
        let Ok(entry) = serde_json::from_slice::<HistoryEntry>(line) else {
            break;
        };
        offset += line.len();

        match entry {
            HistoryEntry::Placement(_) => {
                pending_placements += 1;
                pending_entries += 1;
            }
            HistoryEntry::Touch { user, at } => {
                pending_touches.push((user, at));
                pending_entries += 1;
            }
            HistoryEntry::Commit { entries } => {
                if entries != pending_entries {
                    break;
                }
                state.placements += pending_placements;
                state.last_active.extend(pending_touches.drain(..));
                state.valid_len = offset as u64;
                pending_placements = 0;
                pending_entries = 0;
            }
        }
    }

    state
}

#[derive(Debug)]
struct Ledger {
    file: File,
    placements: u64,
    last_active: HashMap<String, u64>,
}

/// A placement store backed by a JSON-lines history file.
///
/// The file is exclusively locked while the store is open.
///
/// # Example
///
/// ```no_run
/// use pixboard_storage::{FilePlacementStore, PlacementStore};
/// use std::path::Path;
///
/// let store = FilePlacementStore::open(Path::new("board-data/history.jsonl")).unwrap();
/// println!("{} placements", store.count_placements().unwrap());
/// ```
#[derive(Debug)]
pub struct FilePlacementStore {
    path: PathBuf,
    ledger: Mutex<Ledger>,
    /// `None` for read-only handles.
    lock_file: Option<File>,
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

impl FilePlacementStore {
    /// Opens or creates the history file and replays it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process has the file open,
    /// or an I/O error.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path_for(path))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let bytes = fs::read(path)?;
        let replayed = replay(&bytes);
        if replayed.valid_len != bytes.len() as u64 {
            file.set_len(replayed.valid_len)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            ledger: Mutex::new(Ledger {
                file,
                placements: replayed.placements,
                last_active: replayed.last_active,
            }),
            lock_file: Some(lock_file),
        })
    }

    /// Replays an existing history file without locking or repairing it.
    /// Used to read counts while a server owns the file; every write
    /// fails with [`StorageError::ReadOnly`].
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file does not exist.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = File::open(path)?;
        let bytes = fs::read(path)?;
        let replayed = replay(&bytes);

        Ok(Self {
            path: path.to_path_buf(),
            ledger: Mutex::new(Ledger {
                file,
                placements: replayed.placements,
                last_active: replayed.last_active,
            }),
            lock_file: None,
        })
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.lock_file.is_none() {
            return Err(StorageError::ReadOnly(self.path.clone()));
        }
        Ok(())
    }

    /// Returns the history file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a user's last-active timestamp.
    #[must_use]
    pub fn last_active(&self, user_id: &str) -> Option<u64> {
        self.ledger.lock().last_active.get(user_id).copied()
    }

    fn encode_batch(entries: &[HistoryEntry]) -> StorageResult<Vec<u8>> {
        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }
        let commit = HistoryEntry::Commit {
            entries: entries.len() as u64,
        };
        serde_json::to_writer(&mut buf, &commit)?;
        buf.push(b'\n');
        Ok(buf)
    }
}

impl PlacementStore for FilePlacementStore {
    fn count_placements(&self) -> StorageResult<u64> {
        Ok(self.ledger.lock().placements)
    }

    fn commit_batch(
        &self,
        records: &[PlacementRecord],
        active_users: &[String],
        touched_at: u64,
    ) -> StorageResult<()> {
        self.check_writable()?;
        if records.is_empty() && active_users.is_empty() {
            return Ok(());
        }

        let entries: Vec<HistoryEntry> = records
            .iter()
            .cloned()
            .map(HistoryEntry::Placement)
            .chain(active_users.iter().map(|user| HistoryEntry::Touch {
                user: user.clone(),
                at: touched_at,
            }))
            .collect();
        let buf = Self::encode_batch(&entries)?;

        let mut ledger = self.ledger.lock();
        let before = ledger.file.metadata()?.len();
        let written = ledger.file.write_all(&buf).and_then(|()| ledger.file.sync_data());
        if let Err(e) = written {
            // Roll back whatever part of the batch reached the file
            let _ = ledger.file.set_len(before);
            return Err(e.into());
        }

        ledger.placements += records.len() as u64;
        for user in active_users {
            ledger.last_active.insert(user.clone(), touched_at);
        }
        Ok(())
    }

    fn delete_all_placements(&self) -> StorageResult<u64> {
        self.check_writable()?;
        let mut ledger = self.ledger.lock();

        let entries: Vec<HistoryEntry> = ledger
            .last_active
            .iter()
            .map(|(user, at)| HistoryEntry::Touch {
                user: user.clone(),
                at: *at,
            })
            .collect();
        let buf = Self::encode_batch(&entries)?;

        // The old log stays in place until the replacement is complete
        write_atomic(&self.path, &buf)?;
        ledger.file = OpenOptions::new().read(true).append(true).open(&self.path)?;

        let removed = ledger.placements;
        ledger.placements = 0;
        Ok(removed)
    }
}
