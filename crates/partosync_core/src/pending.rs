//! Dirty-set enumeration.
//!
//! A [`PendingSet`] describes the records that still need outbound
//! synchronization. It is lazy (nothing is read until the first item is
//! requested) and restartable (every call to [`PendingSet::iter`] starts a
//! fresh pass over the store).

use crate::error::CoreResult;
use crate::record::StoredRecord;
use partosync_storage::{RecordKey, RecordStore};
use std::sync::Arc;

/// Records with status Dirty or Conflicted, oldest change first.
///
/// Ordering is by `updated_at` ascending, ties broken by record id. Each
/// record is re-read when it is yielded, so a record reconciled after the
/// pass started is skipped rather than pushed twice.
pub struct PendingSet<S, T> {
    store: Arc<S>,
    entity_type: Option<String>,
    decode: fn(StoredRecord) -> CoreResult<T>,
}

impl<S: RecordStore, T> PendingSet<S, T> {
    pub(crate) fn new(
        store: Arc<S>,
        entity_type: Option<String>,
        decode: fn(StoredRecord) -> CoreResult<T>,
    ) -> Self {
        Self {
            store,
            entity_type,
            decode,
        }
    }

    /// Entity type filter, if any.
    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    /// Starts a new pass over the pending records.
    pub fn iter(&self) -> PendingIter<'_, S, T> {
        PendingIter {
            set: self,
            state: State::Unstarted,
        }
    }

    fn matches(&self, row: &StoredRecord) -> bool {
        row.envelope.is_pending()
            && self
                .entity_type
                .as_deref()
                .map_or(true, |t| t == row.entity_type)
    }

    fn snapshot(&self) -> CoreResult<Vec<RecordKey>> {
        let mut pending = Vec::new();
        for (key, bytes) in self.store.scan()? {
            let row = StoredRecord::decode(&bytes)?;
            if self.matches(&row) {
                pending.push((row.envelope.updated_at, key));
            }
        }
        pending.sort_unstable();
        Ok(pending.into_iter().map(|(_, key)| key).collect())
    }

    fn reload(&self, key: &RecordKey) -> CoreResult<Option<StoredRecord>> {
        let Some(bytes) = self.store.get(key)? else {
            return Ok(None);
        };
        let row = StoredRecord::decode(&bytes)?;
        Ok(self.matches(&row).then_some(row))
    }
}

impl<'a, S: RecordStore, T> IntoIterator for &'a PendingSet<S, T> {
    type Item = CoreResult<T>;
    type IntoIter = PendingIter<'a, S, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

enum State {
    Unstarted,
    Queued(std::vec::IntoIter<RecordKey>),
    Done,
}

/// One pass over a [`PendingSet`].
///
/// Yields an error (and then stops) if the initial scan fails; errors
/// reading an individual record are yielded in its place.
pub struct PendingIter<'a, S, T> {
    set: &'a PendingSet<S, T>,
    state: State,
}

impl<S: RecordStore, T> Iterator for PendingIter<'_, S, T> {
    type Item = CoreResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                State::Unstarted => match self.set.snapshot() {
                    Ok(keys) => self.state = State::Queued(keys.into_iter()),
                    Err(e) => {
                        self.state = State::Done;
                        return Some(Err(e));
                    }
                },
                State::Queued(keys) => {
                    let key = keys.next()?;
                    match self.set.reload(&key) {
                        Ok(Some(row)) => return Some((self.set.decode)(row)),
                        Ok(None) => continue,
                        Err(e) => return Some(Err(e)),
                    }
                }
                State::Done => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ContentHash, SyncEnvelope, SyncStatus};
    use crate::id::{DeviceId, RecordId};
    use ciborium::Value;
    use partosync_storage::{InMemoryStore, StorageError, Write};

    fn put(store: &InMemoryStore, n: u8, entity: &str, updated_at: u64, status: SyncStatus) {
        let device = DeviceId::from_bytes([1; 16]);
        let row = StoredRecord {
            entity_type: entity.into(),
            envelope: SyncEnvelope {
                id: RecordId::from_bytes([n; 16]),
                created_at: 0,
                updated_at,
                deleted_at: None,
                device_id: device,
                origin_device_id: device,
                local_version: 1,
                server_version: 0,
                sync_status: status,
                content_hash: ContentHash::from_bytes([n; 32]),
                conflict_payload: None,
            },
            payload: Value::Null,
        };
        let bytes = row.encode().unwrap();
        store
            .transact(&[n; 16], |_| Ok::<_, StorageError>((Write::Put(bytes), ())))
            .unwrap();
    }

    fn ids(set: &PendingSet<InMemoryStore, StoredRecord>) -> Vec<u8> {
        set.iter()
            .map(|r| r.unwrap().envelope.id.as_bytes()[0])
            .collect()
    }

    fn untyped(
        store: &Arc<InMemoryStore>,
        entity: Option<&str>,
    ) -> PendingSet<InMemoryStore, StoredRecord> {
        PendingSet::new(Arc::clone(store), entity.map(String::from), Ok)
    }

    #[test]
    fn oldest_first_with_id_tiebreak() {
        let store = Arc::new(InMemoryStore::new());
        put(&store, 3, "contraction", 300, SyncStatus::Dirty);
        put(&store, 1, "contraction", 500, SyncStatus::Conflicted);
        put(&store, 2, "contraction", 300, SyncStatus::Dirty);
        put(&store, 4, "contraction", 100, SyncStatus::Clean);

        assert_eq!(ids(&untyped(&store, None)), vec![2, 3, 1]);
    }

    #[test]
    fn filters_by_entity_type() {
        let store = Arc::new(InMemoryStore::new());
        put(&store, 1, "contraction", 100, SyncStatus::Dirty);
        put(&store, 2, "temperature", 200, SyncStatus::Dirty);

        assert_eq!(ids(&untyped(&store, Some("temperature"))), vec![2]);
        assert_eq!(ids(&untyped(&store, None)), vec![1, 2]);
    }

    #[test]
    fn is_lazy_and_restartable() {
        let store = Arc::new(InMemoryStore::new());
        let set = untyped(&store, None);
        // Created before any record exists; the scan runs on first use
        put(&store, 1, "contraction", 100, SyncStatus::Dirty);

        assert_eq!(ids(&set), vec![1]);
        put(&store, 2, "contraction", 200, SyncStatus::Dirty);
        assert_eq!(ids(&set), vec![1, 2]);
    }

    #[test]
    fn skips_records_cleaned_mid_pass() {
        let store = Arc::new(InMemoryStore::new());
        put(&store, 1, "contraction", 100, SyncStatus::Dirty);
        put(&store, 2, "contraction", 200, SyncStatus::Dirty);

        let set = untyped(&store, None);
        let mut pass = set.iter();
        assert!(pass.next().unwrap().is_ok());
        put(&store, 2, "contraction", 200, SyncStatus::Clean);
        assert!(pass.next().is_none());
    }

    #[test]
    fn undecodable_row_is_reported() {
        let store = Arc::new(InMemoryStore::with_records([([9u8; 16], vec![0xFF])]));
        let set = untyped(&store, None);
        let results: Vec<_> = set.iter().collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn for_loop_over_reference() {
        let store = Arc::new(InMemoryStore::new());
        put(&store, 1, "contraction", 100, SyncStatus::Dirty);
        let set = untyped(&store, None);

        let mut seen = 0;
        for row in &set {
            assert!(row.unwrap().envelope.is_pending());
            seen += 1;
        }
        assert_eq!(seen, 1);
    }
}
