//! In-process stand-in for the remote authority.
//!
//! The real transport is out of scope for partosync; tests use
//! [`MockAuthority`] to play the server side of push and pull. It accepts
//! every push last-writer-wins and assigns increasing server versions.

use partosync_core::{
    seal, ContentHash, ContentHasher, CoreResult, DeviceId, Millis, ReconcileOutcome, RecordId,
    RemoteRecord, Sha256Hasher, SyncEntity, SyncRepository, SyncStatus,
};
use partosync_storage::RecordStore;
use std::collections::BTreeMap;

/// Result of one push-and-acknowledge round.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoundTrip {
    /// Records pushed to the authority.
    pub pushed: usize,
    /// Outcome of reconciling each acknowledgment, in push order.
    pub outcomes: Vec<(RecordId, ReconcileOutcome)>,
}

/// Server-side record states for one entity type.
#[derive(Debug, Clone)]
pub struct MockAuthority<P> {
    records: BTreeMap<RecordId, RemoteRecord<P>>,
}

impl<P: SyncEntity> Default for MockAuthority<P> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

impl<P: SyncEntity> MockAuthority<P> {
    /// Creates an empty authority.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a pushed record and returns the acknowledgment.
    ///
    /// The acknowledgment echoes the pushed state with the next server
    /// version for that record.
    pub fn accept_push(&mut self, mut pushed: RemoteRecord<P>) -> RemoteRecord<P> {
        let next = self.server_version(pushed.id()) + 1;
        pushed.envelope.server_version = next;
        pushed.envelope.sync_status = SyncStatus::Clean;
        pushed.envelope.conflict_payload = None;
        self.records.insert(pushed.id(), pushed.clone());
        pushed
    }

    /// Applies an edit made on another device and returns the new state,
    /// as a later pull would deliver it.
    ///
    /// # Panics
    ///
    /// Panics if the authority has never seen the record.
    pub fn edit(
        &mut self,
        id: RecordId,
        payload: P,
        device: DeviceId,
        at: Millis,
    ) -> RemoteRecord<P> {
        let current = self
            .records
            .get(&id)
            .cloned()
            .expect("Authority has no such record");
        let mut next = current;
        next.envelope.server_version += 1;
        next.envelope.updated_at = next.envelope.updated_at.max(at);
        next.envelope.device_id = device;
        next.envelope.local_version += 1;
        next.envelope.content_hash = hash(&payload, next.envelope.deleted_at.is_some());
        next.payload = payload;
        self.records.insert(id, next.clone());
        next
    }

    /// Soft-deletes a record on another device and returns the tombstone.
    ///
    /// # Panics
    ///
    /// Panics if the authority has never seen the record.
    pub fn delete(&mut self, id: RecordId, device: DeviceId, at: Millis) -> RemoteRecord<P> {
        let current = self
            .records
            .get(&id)
            .cloned()
            .expect("Authority has no such record");
        let mut next = current;
        next.envelope.server_version += 1;
        next.envelope.updated_at = next.envelope.updated_at.max(at);
        next.envelope.deleted_at = Some(next.envelope.updated_at);
        next.envelope.device_id = device;
        next.envelope.content_hash = hash(&next.payload, true);
        self.records.insert(id, next.clone());
        next
    }

    /// Latest state of a record.
    pub fn get(&self, id: RecordId) -> Option<&RemoteRecord<P>> {
        self.records.get(&id)
    }

    /// Latest server version of a record, 0 if unknown.
    pub fn server_version(&self, id: RecordId) -> u64 {
        self.records
            .get(&id)
            .map_or(0, |record| record.envelope.server_version)
    }

    /// Every record state, as a full pull would deliver it.
    pub fn pull_all(&self) -> Vec<RemoteRecord<P>> {
        self.records.values().cloned().collect()
    }

    /// Pushes every pending record of `repo` and reconciles each
    /// acknowledgment, the way a sync session would.
    ///
    /// Conflicted records are skipped; they need resolution first.
    ///
    /// # Errors
    ///
    /// Propagates repository errors.
    pub fn sync<S, H>(&mut self, repo: &SyncRepository<P, S, H>) -> CoreResult<RoundTrip>
    where
        S: RecordStore,
        H: ContentHasher<P>,
    {
        let mut round = RoundTrip::default();
        for pending in &repo.list_pending() {
            let pending = pending?;
            if pending.envelope.sync_status == SyncStatus::Conflicted {
                continue;
            }
            let id = pending.id();
            let ack = self.accept_push(repo.to_remote(id)?);
            round.pushed += 1;
            round.outcomes.push((id, repo.reconcile(ack)?));
        }
        Ok(round)
    }
}

fn hash<P: SyncEntity>(payload: &P, deleted: bool) -> ContentHash {
    let payload_hash = Sha256Hasher
        .hash(payload)
        .expect("Fixture payloads always encode");
    seal(payload_hash, deleted)
}
