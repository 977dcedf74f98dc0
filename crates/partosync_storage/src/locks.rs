//! Per-record lock table.

use crate::store::RecordKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Hands out one mutex per record key.
///
/// Holding a key's mutex serializes read-modify-write on that record
/// without blocking other records. The table lock is only held long
/// enough to look up or insert the per-key mutex.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    locks: Mutex<HashMap<RecordKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex guarding `key`, creating it on first use.
    pub(crate) fn lock_for(&self, key: &RecordKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(*key).or_default())
    }
}
