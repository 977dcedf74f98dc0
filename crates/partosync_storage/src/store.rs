//! Record store trait definition.

use crate::error::{StorageError, StorageResult};

/// Key of a stored record (the raw bytes of a 128-bit UUID).
pub type RecordKey = [u8; 16];

/// Outcome of a [`RecordStore::transact`] closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Leave the record as it was.
    Keep,
    /// Replace the record with these bytes.
    Put(Vec<u8>),
}

/// A keyed record store.
///
/// Stores are **opaque**: they do not interpret record bytes. The sync
/// core layers its envelope format on top.
///
/// # Invariants
///
/// - `transact` is an atomic read-modify-write for one key: no other
///   `transact` on the same key interleaves with it
/// - `transact` on different keys may run concurrently
/// - a write that fails to persist leaves the previous bytes visible
/// - records are never physically removed
pub trait RecordStore: Send + Sync {
    /// Reads the current bytes of a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &RecordKey) -> StorageResult<Option<Vec<u8>>>;

    /// Runs an atomic read-modify-write on one record.
    ///
    /// `f` receives the current bytes (or `None` for an absent record) and
    /// decides whether to [`Write::Put`] new bytes. When `f` fails nothing
    /// is written. When the durable write fails the error is returned and
    /// the record keeps its previous bytes.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a storage error converted into `E`.
    fn transact<T, E, F>(&self, key: &RecordKey, f: F) -> Result<T, E>
    where
        F: FnOnce(Option<&[u8]>) -> Result<(Write, T), E>,
        E: From<StorageError>;

    /// Returns a snapshot of every record, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn scan(&self) -> StorageResult<Vec<(RecordKey, Vec<u8>)>>;

    /// Returns the keys of every record, ordered.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn keys(&self) -> StorageResult<Vec<RecordKey>>;

    /// Returns the number of records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn len(&self) -> StorageResult<usize>;

    /// Returns true if the store holds no records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads a named metadata entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_meta(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Writes a named metadata entry, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be persisted.
    fn put_meta(&self, name: &str, value: &[u8]) -> StorageResult<()>;

    /// Writes a metadata entry only if none exists yet.
    ///
    /// Returns whichever value is stored afterwards, so concurrent callers
    /// all observe the same winner.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be persisted.
    fn put_meta_if_absent(&self, name: &str, value: &[u8]) -> StorageResult<Vec<u8>>;

    /// Makes every accepted write durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()>;
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn get(&self, key: &RecordKey) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn transact<T, E, F>(&self, key: &RecordKey, f: F) -> Result<T, E>
    where
        F: FnOnce(Option<&[u8]>) -> Result<(Write, T), E>,
        E: From<StorageError>,
    {
        (**self).transact(key, f)
    }

    fn scan(&self) -> StorageResult<Vec<(RecordKey, Vec<u8>)>> {
        (**self).scan()
    }

    fn keys(&self) -> StorageResult<Vec<RecordKey>> {
        (**self).keys()
    }

    fn len(&self) -> StorageResult<usize> {
        (**self).len()
    }

    fn get_meta(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        (**self).get_meta(name)
    }

    fn put_meta(&self, name: &str, value: &[u8]) -> StorageResult<()> {
        (**self).put_meta(name, value)
    }

    fn put_meta_if_absent(&self, name: &str, value: &[u8]) -> StorageResult<Vec<u8>> {
        (**self).put_meta_if_absent(name, value)
    }

    fn flush(&self) -> StorageResult<()> {
        (**self).flush()
    }
}
