//! Record counts for diagnostics.

use crate::envelope::SyncStatus;
use crate::record::StoredRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::AddAssign;

/// Counts for one entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    /// All rows, tombstones included.
    pub total: u64,
    /// Rows without a tombstone.
    pub active: u64,
    /// Soft-deleted rows.
    pub tombstoned: u64,
    /// Rows in sync with the remote authority.
    pub clean: u64,
    /// Rows with unpushed local changes.
    pub dirty: u64,
    /// Rows holding an unresolved conflict.
    pub conflicted: u64,
}

impl EntityStats {
    /// Rows that still need outbound synchronization.
    pub fn pending(&self) -> u64 {
        self.dirty + self.conflicted
    }
}

impl AddAssign for EntityStats {
    fn add_assign(&mut self, other: Self) {
        self.total += other.total;
        self.active += other.active;
        self.tombstoned += other.tombstoned;
        self.clean += other.clean;
        self.dirty += other.dirty;
        self.conflicted += other.conflicted;
    }
}

/// Counts keyed by entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SyncStats {
    by_type: BTreeMap<String, EntityStats>,
}

impl SyncStats {
    pub(crate) fn record(&mut self, row: &StoredRecord) {
        let entry = self.by_type.entry(row.entity_type.clone()).or_default();
        entry.total += 1;
        if row.envelope.is_tombstone() {
            entry.tombstoned += 1;
        } else {
            entry.active += 1;
        }
        match row.envelope.sync_status {
            SyncStatus::Clean => entry.clean += 1,
            SyncStatus::Dirty => entry.dirty += 1,
            SyncStatus::Conflicted => entry.conflicted += 1,
        }
    }

    /// Counts for one entity type.
    pub fn get(&self, entity_type: &str) -> Option<&EntityStats> {
        self.by_type.get(entity_type)
    }

    /// Iterates over entity types in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityStats)> {
        self.by_type.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    /// Sum over all entity types.
    pub fn totals(&self) -> EntityStats {
        let mut sum = EntityStats::default();
        for stats in self.by_type.values() {
            sum += *stats;
        }
        sum
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
