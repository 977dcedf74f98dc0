//! File-based record store for persistent storage.
//!
//! Directory layout:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK           # Advisory lock for single-writer
//! └─ records.log    # Append-only frame log
//! ```

use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::frame::{self, Decoded, Frame, FrameKind};
use crate::locks::KeyLocks;
use crate::store::{RecordKey, RecordStore, Write};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "records.log";
const LOG_TEMP: &str = "records.log.tmp";

/// Committed state rebuilt from the log.
#[derive(Debug, Default)]
struct Index {
    records: BTreeMap<RecordKey, Vec<u8>>,
    meta: HashMap<String, Vec<u8>>,
}

/// A durable record store backed by an append-only frame log.
///
/// Every accepted write appends a frame; on open the log is replayed and
/// the last frame per key wins. The in-memory index is only updated after
/// the append succeeded, so a failed write is never visible. A failed
/// append is cut back out of the log before the error is returned.
///
/// # Durability
///
/// - With `sync_on_write` every append is followed by `File::sync_data()`
/// - Otherwise [`RecordStore::flush`] syncs the log
///
/// # Recovery
///
/// A torn final frame (crash mid-append) is discarded and the log is
/// truncated back to the last complete frame. A frame that looks torn but
/// is followed by an intact frame has a damaged header; that, and damage
/// anywhere else, is reported as corruption and the log is left untouched.
///
/// # Example
///
/// ```no_run
/// use partosync_storage::{FileStore, RecordStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("ward-3.store")).unwrap();
/// println!("{} records", store.len().unwrap());
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    config: StoreConfig,
    /// Append handle; also serializes appends with index updates.
    log: Mutex<File>,
    index: RwLock<Index>,
    locks: KeyLocks,
    /// Set when a failed append could not be cut back out of the log.
    damaged: AtomicBool,
    /// Held for exclusive access.
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if another process holds the lock, the log is
    /// corrupted, or an I/O error occurs.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Opens a store with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (`Locked`)
    /// - The log is corrupted
    /// - I/O errors occur
    pub fn open_with_config(path: &Path, config: StoreConfig) -> StorageResult<Self> {
        if !path.exists() {
            if config.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::Missing(path.display().to_string()));
            }
        }

        if !path.is_dir() {
            return Err(StorageError::NotADirectory(path.display().to_string()));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        // Non-blocking: a second writer must fail fast
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let mut log = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOG_FILE))?;

        let index = Self::recover(&mut log)?;
        info!(
            path = %path.display(),
            records = index.records.len(),
            "opened record store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            config,
            log: Mutex::new(log),
            index: RwLock::new(index),
            locks: KeyLocks::new(),
            damaged: AtomicBool::new(false),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the record log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// Returns the current size of the record log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    pub fn log_size(&self) -> StorageResult<u64> {
        Ok(self.log.lock().metadata()?.len())
    }

    /// Rewrites the log so it holds only the latest frame per key.
    ///
    /// Uses write-then-rename for crash safety. Returns the number of
    /// bytes reclaimed.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite fails; the old log stays in place.
    pub fn compact(&self) -> StorageResult<u64> {
        let mut log = self.log.lock();
        let before = log.metadata()?.len();

        let temp_path = self.path.join(LOG_TEMP);
        let mut temp = File::create(&temp_path)?;
        {
            let index = self.index.read();
            for (name, value) in &index.meta {
                temp.write_all(&Frame::meta(name, value.clone()).encode()?)?;
            }
            for (key, value) in &index.records {
                temp.write_all(&Frame::record(key, value.clone()).encode()?)?;
            }
        }
        temp.sync_all()?;
        drop(temp);

        fs::rename(&temp_path, self.log_path())?;
        self.sync_directory()?;

        *log = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.log_path())?;
        let after = log.metadata()?.len();
        // The rewritten log holds only indexed state
        self.damaged.store(false, Ordering::Release);

        info!(before, after, "compacted record log");
        Ok(before.saturating_sub(after))
    }

    /// Replays the log into a fresh index, truncating a torn tail.
    fn recover(log: &mut File) -> StorageResult<Index> {
        let mut data = Vec::new();
        log.seek(SeekFrom::Start(0))?;
        log.read_to_end(&mut data)?;

        let mut index = Index::default();
        let mut offset = 0usize;

        while offset < data.len() {
            match Frame::decode_at(&data, offset)? {
                Decoded::Frame(frame, len) => {
                    Self::apply(&mut index, frame)?;
                    offset += len;
                }
                Decoded::Torn => {
                    if let Some(next) = frame::next_intact_frame(&data, offset + 1) {
                        return Err(StorageError::corrupted(format!(
                            "frame at offset {offset} overruns intact frame at offset {next}"
                        )));
                    }
                    warn!(
                        offset,
                        discarded = data.len() - offset,
                        "discarding torn frame at end of record log"
                    );
                    log.set_len(offset as u64)?;
                    log.sync_all()?;
                    break;
                }
            }
        }

        Ok(index)
    }

    fn apply(index: &mut Index, frame: Frame) -> StorageResult<()> {
        match frame.kind {
            FrameKind::Record => {
                let key: RecordKey = frame
                    .key
                    .as_slice()
                    .try_into()
                    .map_err(|_| StorageError::corrupted("record key must be 16 bytes"))?;
                index.records.insert(key, frame.payload);
            }
            FrameKind::Meta => {
                let name = String::from_utf8(frame.key)
                    .map_err(|_| StorageError::corrupted("metadata name is not UTF-8"))?;
                index.meta.insert(name, frame.payload);
            }
        }
        Ok(())
    }

    /// Appends one frame. Caller holds the log mutex.
    fn append(&self, log: &mut File, frame: &Frame) -> StorageResult<()> {
        if self.damaged.load(Ordering::Acquire) {
            return Err(StorageError::corrupted(
                "record log holds a failed write that could not be rolled back",
            ));
        }
        let bytes = frame.encode()?;
        append_frame(log, &bytes, self.config.sync_on_write, &self.damaged)
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// The operations an append needs from the log file.
trait LogFile: IoWrite + Seek {
    fn size(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_all()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Writes `bytes` at the end of the log, optionally syncing.
///
/// On a failed write or sync the log is cut back to its previous length so
/// no partial frame is left in front of later appends. If that also fails,
/// `damaged` is set and the original error is returned.
fn append_frame<L: LogFile>(
    log: &mut L,
    bytes: &[u8],
    sync: bool,
    damaged: &AtomicBool,
) -> StorageResult<()> {
    let prev_len = log.size()?;
    log.seek(SeekFrom::Start(prev_len))?;

    let mut result = log.write_all(bytes);
    if result.is_ok() && sync {
        result = log.sync();
    }
    let Err(err) = result else {
        return Ok(());
    };

    match log.truncate(prev_len) {
        Ok(()) => warn!(error = %err, prev_len, "append failed, rolled back record log"),
        Err(rollback) => {
            damaged.store(true, Ordering::Release);
            warn!(
                error = %err,
                rollback_error = %rollback,
                prev_len,
                "append failed and rollback failed, record log is damaged"
            );
        }
    }
    Err(err.into())
}

impl RecordStore for FileStore {
    fn get(&self, key: &RecordKey) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.index.read().records.get(key).cloned())
    }

    fn transact<T, E, F>(&self, key: &RecordKey, f: F) -> Result<T, E>
    where
        F: FnOnce(Option<&[u8]>) -> Result<(Write, T), E>,
        E: From<StorageError>,
    {
        let lock = self.locks.lock_for(key);
        let _guard = lock.lock();

        let current = self.index.read().records.get(key).cloned();
        let (write, value) = f(current.as_deref())?;

        if let Write::Put(bytes) = write {
            let frame = Frame::record(key, bytes);
            let mut log = self.log.lock();
            self.append(&mut log, &frame)?;
            self.index.write().records.insert(*key, frame.payload);
            debug!(key = ?key, "appended record frame");
        }

        Ok(value)
    }

    fn scan(&self) -> StorageResult<Vec<(RecordKey, Vec<u8>)>> {
        Ok(self
            .index
            .read()
            .records
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }

    fn keys(&self) -> StorageResult<Vec<RecordKey>> {
        Ok(self.index.read().records.keys().copied().collect())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.index.read().records.len())
    }

    fn get_meta(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.index.read().meta.get(name).cloned())
    }

    fn put_meta(&self, name: &str, value: &[u8]) -> StorageResult<()> {
        let frame = Frame::meta(name, value.to_vec());
        let mut log = self.log.lock();
        self.append(&mut log, &frame)?;
        self.index
            .write()
            .meta
            .insert(name.to_string(), frame.payload);
        Ok(())
    }

    fn put_meta_if_absent(&self, name: &str, value: &[u8]) -> StorageResult<Vec<u8>> {
        let mut log = self.log.lock();
        if let Some(existing) = self.index.read().meta.get(name) {
            return Ok(existing.clone());
        }
        let frame = Frame::meta(name, value.to_vec());
        self.append(&mut log, &frame)?;
        self.index
            .write()
            .meta
            .insert(name.to_string(), frame.payload.clone());
        Ok(frame.payload)
    }

    fn flush(&self) -> StorageResult<()> {
        let log = self.log.lock();
        log.sync_all()?;
        Ok(())
    }
}
