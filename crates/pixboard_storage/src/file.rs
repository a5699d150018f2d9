//! File-based key/value backend for persistent storage.
//!
//! Layout of a data directory:
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK              # Advisory lock held by the writing process
//! ├─ <key>.val         # Plain value, replaced atomically
//! └─ <key>.list        # [u64 LE head offset][u32 LE length][bytes]...
//! ```
//!
//! Values are written to a temporary file and renamed into place, so a
//! reader never sees a half-written snapshot.
//!
//! Lists are append-only record logs. A push appends all new records with a
//! single write; a torn record at the tail (crash mid-append) is ignored on
//! read and cut off when the writer next opens the list. A pop reads records
//! starting at the head offset and then overwrites the 8-byte header, so
//! neither operation rewrites the list. The file is removed once drained and
//! compacted when the consumed prefix outgrows what is still queued.

use crate::backend::{validate_key, KvBackend};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const VALUE_EXT: &str = "val";
const LIST_EXT: &str = "list";
const LEN_PREFIX: usize = 4;
const HEADER_LEN: u64 = 8;

/// Consumed bytes a list may carry before a pop compacts it.
const COMPACT_MIN_BYTES: u64 = 64 * 1024;

/// Writes `data` to a sibling temp file and renames it over `path`.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_optional(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_exists(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Where the live records of a list sit in its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ListState {
    /// Offset of the first unpopped record.
    head: u64,
    /// Offset just past the last complete record.
    end: u64,
    /// Number of records between `head` and `end`.
    len: u64,
}

impl ListState {
    const EMPTY: ListState = ListState {
        head: HEADER_LEN,
        end: HEADER_LEN,
        len: 0,
    };
}

/// Scans a list file. Returns its live state and the raw file length, which
/// exceeds `end` when the tail is torn.
fn scan_list(path: &Path) -> StorageResult<Option<(ListState, u64)>> {
    let Some(bytes) = read_optional(path)? else {
        return Ok(None);
    };
    let file_len = bytes.len() as u64;
    if file_len < HEADER_LEN {
        // Creation was interrupted before the header landed
        return Ok(Some((ListState::EMPTY, file_len)));
    }

    let mut header = [0u8; HEADER_LEN as usize];
    header.copy_from_slice(&bytes[..HEADER_LEN as usize]);
    let head = u64::from_le_bytes(header);
    if head < HEADER_LEN || head > file_len {
        return Err(StorageError::Corrupted(format!(
            "list head {head} outside {}",
            path.display()
        )));
    }

    let (len, valid) = scan_records(&bytes[head as usize..]);
    let state = ListState {
        head,
        end: head + valid as u64,
        len,
    };
    Ok(Some((state, file_len)))
}

/// Counts the complete records in `bytes`, stopping at the first torn one.
/// Returns the count and the byte length they span.
fn scan_records(bytes: &[u8]) -> (u64, usize) {
    let mut count = 0;
    let mut pos = 0;

    while pos + LEN_PREFIX <= bytes.len() {
        let mut prefix = [0u8; LEN_PREFIX];
        prefix.copy_from_slice(&bytes[pos..pos + LEN_PREFIX]);
        let len = u32::from_le_bytes(prefix) as usize;
        let start = pos + LEN_PREFIX;
        let Some(end) = start.checked_add(len).filter(|end| *end <= bytes.len()) else {
            break;
        };
        count += 1;
        pos = end;
    }

    (count, pos)
}

fn encode_records(items: &[Vec<u8>]) -> StorageResult<Vec<u8>> {
    let total: usize = items.iter().map(|i| i.len() + LEN_PREFIX).sum();
    let mut out = Vec::with_capacity(total);
    for item in items {
        let len = u32::try_from(item.len()).map_err(|_| {
            StorageError::Serialization(format!("list item too large: {} bytes", item.len()))
        })?;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(item);
    }
    Ok(out)
}

fn read_records(reader: &mut impl Read, count: usize) -> StorageResult<(Vec<Vec<u8>>, u64)> {
    let mut items = Vec::with_capacity(count);
    let mut consumed = 0u64;
    for _ in 0..count {
        let mut prefix = [0u8; LEN_PREFIX];
        reader.read_exact(&mut prefix)?;
        let len = u32::from_le_bytes(prefix) as usize;
        let mut item = vec![0u8; len];
        reader.read_exact(&mut item)?;
        consumed += (LEN_PREFIX + len) as u64;
        items.push(item);
    }
    Ok((items, consumed))
}

/// A file-based key/value backend.
///
/// Data survives process restarts. A writable backend holds an exclusive
/// advisory lock on its directory for as long as it is alive; read-only
/// handles take no lock and may sit alongside it.
///
/// # Thread Safety
///
/// This backend is thread-safe. All file operations are serialized by an
/// internal lock.
///
/// # Example
///
/// ```no_run
/// use pixboard_storage::{KvBackend, FileBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("board-data")).unwrap();
/// backend.set("canvas:grid", &[0u8; 16]).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    /// List positions, filled on first access. Unused when read-only.
    lists: Mutex<HashMap<String, ListState>>,
    read_only: bool,
    _lock_file: Option<File>,
}

impl FileBackend {
    /// Opens or creates a data directory for writing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the
    /// directory, or an I/O error if it cannot be created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        fs::create_dir_all(path)?;

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }

        Ok(Self {
            root: path.to_path_buf(),
            lists: Mutex::new(HashMap::new()),
            read_only: false,
            _lock_file: Some(lock_file),
        })
    }

    /// Opens an existing data directory for reading, without taking the
    /// lock. Used to observe a directory a running server owns.
    ///
    /// Every read goes to disk; writes fail with [`StorageError::ReadOnly`].
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory does not exist.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        if !fs::metadata(path)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", path.display()),
            )
            .into());
        }

        Ok(Self {
            root: path.to_path_buf(),
            lists: Mutex::new(HashMap::new()),
            read_only: true,
            _lock_file: None,
        })
    }

    /// Returns the data directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, key: &str, ext: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        // ':' is not portable in file names
        let stem = key.replace(':', "~");
        Ok(self.root.join(format!("{stem}.{ext}")))
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly(self.root.clone()));
        }
        Ok(())
    }

    /// Returns the cached state of a list, scanning and repairing its file
    /// on first access.
    fn list_state(
        lists: &mut HashMap<String, ListState>,
        key: &str,
        path: &Path,
    ) -> StorageResult<ListState> {
        if let Some(state) = lists.get(key) {
            return Ok(*state);
        }

        let state = match scan_list(path)? {
            None => ListState::EMPTY,
            Some((_, file_len)) if file_len < HEADER_LEN => {
                remove_if_exists(path)?;
                ListState::EMPTY
            }
            Some((state, file_len)) => {
                if file_len != state.end {
                    // Drop a torn record left by an interrupted append
                    let file = OpenOptions::new().write(true).open(path)?;
                    file.set_len(state.end)?;
                    file.sync_data()?;
                }
                state
            }
        };
        lists.insert(key.to_string(), state);
        Ok(state)
    }

    fn append(path: &Path, state: ListState, encoded: &[u8]) -> StorageResult<()> {
        let mut file = OpenOptions::new().append(true).open(path)?;
        let written = file.write_all(encoded).and_then(|()| file.sync_data());
        if let Err(e) = written {
            let _ = file.set_len(state.end);
            return Err(e.into());
        }
        Ok(())
    }

    fn compact(path: &Path, file: &mut File, from: u64, end: u64) -> StorageResult<u64> {
        let mut rest = vec![0u8; (end - from) as usize];
        file.seek(SeekFrom::Start(from))?;
        file.read_exact(&mut rest)?;

        let mut out = Vec::with_capacity(HEADER_LEN as usize + rest.len());
        out.extend_from_slice(&HEADER_LEN.to_le_bytes());
        out.extend_from_slice(&rest);
        write_atomic(path, &out)?;
        Ok(out.len() as u64)
    }
}

impl KvBackend for FileBackend {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.file_for(key, VALUE_EXT)?;
        let _guard = self.lists.lock();
        read_optional(&path)
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.check_writable()?;
        let path = self.file_for(key, VALUE_EXT)?;
        let _guard = self.lists.lock();
        write_atomic(&path, value)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        self.check_writable()?;
        let value_path = self.file_for(key, VALUE_EXT)?;
        let list_path = self.file_for(key, LIST_EXT)?;
        let mut lists = self.lists.lock();
        lists.remove(key);

        let removed_value = remove_if_exists(&value_path)?;
        let removed_list = remove_if_exists(&list_path)?;
        Ok(removed_value || removed_list)
    }

    fn list_push(&self, key: &str, items: &[Vec<u8>]) -> StorageResult<u64> {
        self.check_writable()?;
        let path = self.file_for(key, LIST_EXT)?;
        let mut lists = self.lists.lock();

        let state = Self::list_state(&mut lists, key, &path)?;
        if items.is_empty() {
            return Ok(state.len);
        }

        let encoded = encode_records(items)?;
        let next = if path.exists() {
            if let Err(e) = Self::append(&path, state, &encoded) {
                lists.remove(key);
                return Err(e);
            }
            ListState {
                end: state.end + encoded.len() as u64,
                len: state.len + items.len() as u64,
                ..state
            }
        } else {
            let mut out = Vec::with_capacity(HEADER_LEN as usize + encoded.len());
            out.extend_from_slice(&HEADER_LEN.to_le_bytes());
            out.extend_from_slice(&encoded);
            write_atomic(&path, &out)?;
            ListState {
                head: HEADER_LEN,
                end: out.len() as u64,
                len: items.len() as u64,
            }
        };

        lists.insert(key.to_string(), next);
        Ok(next.len)
    }

    fn list_pop(&self, key: &str, count: usize) -> StorageResult<Vec<Vec<u8>>> {
        self.check_writable()?;
        let path = self.file_for(key, LIST_EXT)?;
        let mut lists = self.lists.lock();

        let state = Self::list_state(&mut lists, key, &path)?;
        if state.len == 0 || count == 0 {
            return Ok(Vec::new());
        }

        let take = count.min(state.len as usize);
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        file.seek(SeekFrom::Start(state.head))?;
        let (items, consumed) = read_records(&mut BufReader::new(&file), take)?;

        let head = state.head + consumed;
        let remaining = state.len - take as u64;
        let consumed_total = head - HEADER_LEN;
        let live = state.end - head;

        let next = if remaining == 0 {
            drop(file);
            remove_if_exists(&path)?;
            ListState::EMPTY
        } else if consumed_total >= COMPACT_MIN_BYTES && consumed_total >= live {
            let end = Self::compact(&path, &mut file, head, state.end)?;
            ListState {
                head: HEADER_LEN,
                end,
                len: remaining,
            }
        } else {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&head.to_le_bytes())?;
            file.sync_data()?;
            ListState {
                head,
                len: remaining,
                ..state
            }
        };

        lists.insert(key.to_string(), next);
        Ok(items)
    }

    fn list_len(&self, key: &str) -> StorageResult<u64> {
        let path = self.file_for(key, LIST_EXT)?;
        let mut lists = self.lists.lock();

        if self.read_only {
            return Ok(scan_list(&path)?.map_or(0, |(state, _)| state.len));
        }
        Ok(Self::list_state(&mut lists, key, &path)?.len)
    }
}
