//! Local mutation rules.
//!
//! These functions stamp envelopes for saves made on this device. They are
//! pure: the repository runs them inside one store transaction per record
//! and persists the result.

use crate::config::SavePolicy;
use crate::envelope::{ContentHash, Millis, SyncEnvelope, SyncStatus};
use crate::hash::seal;
use crate::id::{DeviceId, RecordId};

/// Who is writing and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    /// The current device.
    pub device_id: DeviceId,
    /// Clock reading for this mutation.
    pub now: Millis,
}

impl Stamp {
    /// Creates a stamp.
    pub fn new(device_id: DeviceId, now: Millis) -> Self {
        Self { device_id, now }
    }

    /// The mutation time, never earlier than the record's last update.
    fn time_after(&self, existing: &SyncEnvelope) -> Millis {
        self.now.max(existing.updated_at)
    }
}

/// Envelope for a brand-new record.
pub fn stamp_create(id: RecordId, payload_hash: ContentHash, stamp: Stamp) -> SyncEnvelope {
    SyncEnvelope {
        id,
        created_at: stamp.now,
        updated_at: stamp.now,
        deleted_at: None,
        device_id: stamp.device_id,
        origin_device_id: stamp.device_id,
        local_version: 1,
        server_version: 0,
        sync_status: SyncStatus::Dirty,
        content_hash: payload_hash,
        conflict_payload: None,
    }
}

/// Envelope after a local edit.
///
/// Returns `None` when `policy` is [`SavePolicy::SkipUnchanged`] and the
/// content did not change; the stored record then stays untouched.
///
/// `server_version`, `created_at`, `origin_device_id` and a tombstone's
/// `deleted_at` carry over. A held conflict snapshot also carries over:
/// a local edit does not settle a conflict, so the record stays
/// Conflicted until it is resolved or reconciled.
pub fn stamp_update(
    existing: &SyncEnvelope,
    payload_hash: ContentHash,
    stamp: Stamp,
    policy: SavePolicy,
) -> Option<SyncEnvelope> {
    let content_hash = seal(payload_hash, existing.is_tombstone());
    if policy == SavePolicy::SkipUnchanged && content_hash == existing.content_hash {
        return None;
    }

    let sync_status = if existing.conflict_payload.is_some() {
        SyncStatus::Conflicted
    } else {
        SyncStatus::Dirty
    };

    Some(SyncEnvelope {
        updated_at: stamp.time_after(existing),
        device_id: stamp.device_id,
        local_version: existing.local_version + 1,
        content_hash,
        sync_status,
        ..existing.clone()
    })
}

/// Envelope after a local soft delete.
///
/// `payload_hash` is the hash of the (unchanged) stored payload. Deleting
/// a tombstone again returns `None`: the original deletion time stands.
pub fn stamp_delete(
    existing: &SyncEnvelope,
    payload_hash: ContentHash,
    stamp: Stamp,
) -> Option<SyncEnvelope> {
    if existing.is_tombstone() {
        return None;
    }

    let now = stamp.time_after(existing);
    let sync_status = if existing.conflict_payload.is_some() {
        SyncStatus::Conflicted
    } else {
        SyncStatus::Dirty
    };

    Some(SyncEnvelope {
        updated_at: now,
        deleted_at: Some(now),
        device_id: stamp.device_id,
        local_version: existing.local_version + 1,
        content_hash: seal(payload_hash, true),
        sync_status,
        ..existing.clone()
    })
}

/// Envelope after choosing the local side of a conflict.
///
/// The remote snapshot is dropped and its `server_version` adopted, so the
/// next push is based on the newest server state; the record stays dirty
/// and counts as a fresh local mutation.
pub fn stamp_keep_local(
    existing: &SyncEnvelope,
    remote_server_version: u64,
    stamp: Stamp,
) -> SyncEnvelope {
    SyncEnvelope {
        updated_at: stamp.time_after(existing),
        device_id: stamp.device_id,
        local_version: existing.local_version + 1,
        server_version: existing.server_version.max(remote_server_version),
        sync_status: SyncStatus::Dirty,
        conflict_payload: None,
        ..existing.clone()
    }
}
