//! In-memory record store for testing.

use crate::error::{StorageError, StorageResult};
use crate::locks::KeyLocks;
use crate::store::{RecordKey, RecordStore, Write};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};

/// An in-memory record store.
///
/// This store keeps all records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads. Writes to
/// the same record are serialized by a per-record mutex.
///
/// # Example
///
/// ```rust
/// use partosync_storage::{InMemoryStore, RecordStore};
///
/// let store = InMemoryStore::new();
/// store.put_meta("device_id", b"abc").unwrap();
/// assert_eq!(store.get_meta("device_id").unwrap(), Some(b"abc".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<BTreeMap<RecordKey, Vec<u8>>>,
    meta: Mutex<HashMap<String, Vec<u8>>>,
    locks: KeyLocks,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with records.
    ///
    /// Useful for testing recovery and import scenarios.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = (RecordKey, Vec<u8>)>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().collect()),
            ..Self::default()
        }
    }
}

impl RecordStore for InMemoryStore {
    fn get(&self, key: &RecordKey) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn transact<T, E, F>(&self, key: &RecordKey, f: F) -> Result<T, E>
    where
        F: FnOnce(Option<&[u8]>) -> Result<(Write, T), E>,
        E: From<StorageError>,
    {
        let lock = self.locks.lock_for(key);
        let _guard = lock.lock();

        let current = self.records.read().get(key).cloned();
        let (write, value) = f(current.as_deref())?;

        if let Write::Put(bytes) = write {
            self.records.write().insert(*key, bytes);
        }

        Ok(value)
    }

    fn scan(&self) -> StorageResult<Vec<(RecordKey, Vec<u8>)>> {
        Ok(self
            .records
            .read()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }

    fn keys(&self) -> StorageResult<Vec<RecordKey>> {
        Ok(self.records.read().keys().copied().collect())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.records.read().len())
    }

    fn get_meta(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.meta.lock().get(name).cloned())
    }

    fn put_meta(&self, name: &str, value: &[u8]) -> StorageResult<()> {
        self.meta.lock().insert(name.to_string(), value.to_vec());
        Ok(())
    }

    fn put_meta_if_absent(&self, name: &str, value: &[u8]) -> StorageResult<Vec<u8>> {
        let mut meta = self.meta.lock();
        Ok(meta
            .entry(name.to_string())
            .or_insert_with(|| value.to_vec())
            .clone())
    }

    fn flush(&self) -> StorageResult<()> {
        // Nothing is buffered
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn put(store: &InMemoryStore, key: RecordKey, bytes: &[u8]) {
        store
            .transact(&key, |_| Ok::<_, StorageError>((Write::Put(bytes.to_vec()), ())))
            .unwrap();
    }

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty().unwrap());
        assert!(store.scan().unwrap().is_empty());
    }

    #[test]
    fn memory_transact_put_and_get() {
        let store = InMemoryStore::new();
        put(&store, [1u8; 16], b"hello");
        assert_eq!(store.get(&[1u8; 16]).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn memory_transact_sees_current_bytes() {
        let store = InMemoryStore::new();
        put(&store, [1u8; 16], b"v1");

        let seen = store
            .transact(&[1u8; 16], |current| {
                let seen = current.map(<[u8]>::to_vec);
                Ok::<_, StorageError>((Write::Put(b"v2".to_vec()), seen))
            })
            .unwrap();

        assert_eq!(seen, Some(b"v1".to_vec()));
        assert_eq!(store.get(&[1u8; 16]).unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn memory_keep_leaves_record_absent() {
        let store = InMemoryStore::new();
        store
            .transact(&[3u8; 16], |_| Ok::<_, StorageError>((Write::Keep, ())))
            .unwrap();
        assert_eq!(store.get(&[3u8; 16]).unwrap(), None);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn memory_failed_closure_writes_nothing() {
        let store = InMemoryStore::new();
        put(&store, [1u8; 16], b"original");

        let result: Result<(), StorageError> = store.transact(&[1u8; 16], |_| {
            Err(StorageError::corrupted("rejected by caller"))
        });

        assert!(result.is_err());
        assert_eq!(store.get(&[1u8; 16]).unwrap(), Some(b"original".to_vec()));
    }

    #[test]
    fn memory_scan_is_key_ordered() {
        let store = InMemoryStore::new();
        put(&store, [9u8; 16], b"c");
        put(&store, [1u8; 16], b"a");
        put(&store, [5u8; 16], b"b");

        let keys = store.keys().unwrap();
        assert_eq!(keys, vec![[1u8; 16], [5u8; 16], [9u8; 16]]);
    }

    #[test]
    fn memory_meta_if_absent_keeps_first_value() {
        let store = InMemoryStore::new();
        let first = store.put_meta_if_absent("device_id", b"first").unwrap();
        let second = store.put_meta_if_absent("device_id", b"second").unwrap();
        assert_eq!(first, b"first".to_vec());
        assert_eq!(second, b"first".to_vec());
    }

    #[test]
    fn memory_with_records() {
        let store = InMemoryStore::with_records(vec![([4u8; 16], b"preloaded".to_vec())]);
        assert_eq!(store.get(&[4u8; 16]).unwrap(), Some(b"preloaded".to_vec()));
    }

    #[test]
    fn memory_concurrent_increments_are_serialized() {
        let store = Arc::new(InMemoryStore::new());
        let key = [8u8; 16];
        put(&store, key, &0u64.to_le_bytes());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store
                            .transact(&key, |current| {
                                let bytes: [u8; 8] = current.unwrap().try_into().unwrap();
                                let next = u64::from_le_bytes(bytes) + 1;
                                Ok::<_, StorageError>((Write::Put(next.to_le_bytes().to_vec()), ()))
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let bytes: [u8; 8] = store.get(&key).unwrap().unwrap().try_into().unwrap();
        assert_eq!(u64::from_le_bytes(bytes), 800);
    }
}
