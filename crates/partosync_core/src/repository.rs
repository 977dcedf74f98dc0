//! Typed repository facade.

use crate::coordinator::{stamp_create, stamp_delete, stamp_keep_local, stamp_update};
use crate::engine::EngineContext;
use crate::entity::{RemoteRecord, SyncEntity, Versioned};
use crate::envelope::ContentHash;
use crate::error::{CoreError, CoreResult};
use crate::hash::{seal, ContentHasher, Sha256Hasher};
use crate::id::RecordId;
use crate::pending::PendingSet;
use crate::reconciler::{self, ReconcileContext, ReconcileOutcome};
use crate::record::StoredRecord;
use partosync_storage::{RecordStore, Write};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which side of a conflict to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Keep the local state and push it on top of the newer server version.
    KeepLocal,
    /// Replace the local state with the held remote snapshot.
    AcceptRemote,
}

/// Storage and sync rules for one entity type.
///
/// Every mutation runs as a single read-modify-write transaction on the
/// record, so version increments and hash updates are never interleaved.
/// Records of other entity types stored under the same id are reported as
/// [`CoreError::EntityTypeMismatch`].
pub struct SyncRepository<P, S, H = Sha256Hasher> {
    ctx: EngineContext<S>,
    hasher: H,
    _marker: PhantomData<fn() -> P>,
}

impl<P, S, H> SyncRepository<P, S, H>
where
    P: SyncEntity,
    S: RecordStore,
    H: ContentHasher<P>,
{
    pub(crate) fn new(ctx: EngineContext<S>, hasher: H) -> Self {
        Self {
            ctx,
            hasher,
            _marker: PhantomData,
        }
    }

    /// Entity type handled by this repository.
    pub fn entity_type(&self) -> &'static str {
        P::ENTITY_TYPE
    }

    /// Creates a record with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns a storage, codec or device identity error.
    pub fn create(&self, payload: P) -> CoreResult<Versioned<P>> {
        self.create_with_id(RecordId::new(), payload)
    }

    /// Creates a record under a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the id is taken, or a storage, codec
    /// or device identity error.
    pub fn create_with_id(&self, id: RecordId, payload: P) -> CoreResult<Versioned<P>> {
        let stamp = self.ctx.stamp()?;
        let envelope = stamp_create(id, self.hasher.hash(&payload)?, stamp);
        let row = StoredRecord::from_typed(envelope.clone(), &payload)?;
        let bytes = row.encode()?;

        self.ctx.store.transact(id.as_bytes(), |current| {
            if current.is_some() {
                return Err(CoreError::invalid_operation(format!(
                    "record {id} already exists"
                )));
            }
            Ok((Write::Put(bytes), ()))
        })?;

        debug!(entity = P::ENTITY_TYPE, id = %id, "created record");
        Ok(Versioned { envelope, payload })
    }

    /// Replaces the payload of an existing record.
    ///
    /// Editing a tombstone keeps it deleted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist, or a storage,
    /// codec or device identity error.
    pub fn update(&self, id: RecordId, payload: P) -> CoreResult<Versioned<P>> {
        let stamp = self.ctx.stamp()?;
        let payload_hash = self.hasher.hash(&payload)?;
        let policy = self.ctx.config.save_policy;

        self.ctx.store.transact(id.as_bytes(), |current| {
            let existing = self.existing(id, current)?;
            let Some(envelope) = stamp_update(&existing.envelope, payload_hash, stamp, policy)
            else {
                debug!(entity = P::ENTITY_TYPE, id = %id, "skipped unchanged save");
                return Ok((Write::Keep, existing.into_versioned()?));
            };

            debug!(
                entity = P::ENTITY_TYPE,
                id = %id,
                local_version = envelope.local_version,
                "updated record"
            );
            let row = StoredRecord::from_typed(envelope.clone(), &payload)?;
            Ok((Write::Put(row.encode()?), Versioned { envelope, payload }))
        })
    }

    /// Soft-deletes a record.
    ///
    /// The row is kept as a tombstone so the deletion can propagate.
    /// Deleting a tombstone again returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist, or a storage,
    /// codec or device identity error.
    pub fn delete(&self, id: RecordId) -> CoreResult<Versioned<P>> {
        let stamp = self.ctx.stamp()?;

        self.ctx.store.transact(id.as_bytes(), |current| {
            let existing = self.existing(id, current)?.into_versioned::<P>()?;
            let payload_hash = self.hasher.hash(&existing.payload)?;
            let Some(envelope) = stamp_delete(&existing.envelope, payload_hash, stamp) else {
                return Ok((Write::Keep, existing));
            };

            debug!(
                entity = P::ENTITY_TYPE,
                id = %id,
                local_version = envelope.local_version,
                "deleted record"
            );
            let row = StoredRecord::from_typed(envelope.clone(), &existing.payload)?;
            let deleted = Versioned {
                envelope,
                payload: existing.payload,
            };
            Ok((Write::Put(row.encode()?), deleted))
        })
    }

    /// Fetches a record, tombstones included.
    ///
    /// # Errors
    ///
    /// Returns `EntityTypeMismatch` if the id holds another entity type,
    /// or a storage or codec error.
    pub fn get(&self, id: RecordId) -> CoreResult<Option<Versioned<P>>> {
        self.load(id)?.map(StoredRecord::into_versioned::<P>).transpose()
    }

    /// Fetches a record unless it is a tombstone.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn get_active(&self, id: RecordId) -> CoreResult<Option<Versioned<P>>> {
        Ok(self.get(id)?.filter(|record| !record.is_tombstone()))
    }

    /// Lists live records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn list_active(&self) -> CoreResult<Vec<Versioned<P>>> {
        let mut records = self.list_all()?;
        records.retain(|record| !record.is_tombstone());
        Ok(records)
    }

    /// Lists every record including tombstones, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error.
    pub fn list_all(&self) -> CoreResult<Vec<Versioned<P>>> {
        let mut records = self
            .ctx
            .rows()?
            .into_iter()
            .filter(|row| row.entity_type == P::ENTITY_TYPE)
            .map(StoredRecord::into_versioned::<P>)
            .collect::<CoreResult<Vec<_>>>()?;
        records.sort_by_key(|record| (record.envelope.created_at, record.id()));
        Ok(records)
    }

    /// Applies a record state received from the remote authority.
    ///
    /// The content hash is recomputed from the incoming payload; a claimed
    /// hash that disagrees is logged and replaced.
    ///
    /// # Errors
    ///
    /// Returns `EntityTypeMismatch` if the id holds another entity type,
    /// or a storage, codec or device identity error. A conflict is not an
    /// error.
    pub fn reconcile(&self, remote: RemoteRecord<P>) -> CoreResult<ReconcileOutcome> {
        let id = remote.id();
        let mut incoming = StoredRecord::from_remote(&remote)?;
        let recomputed = self.remote_hash(&remote)?;
        if recomputed != incoming.envelope.content_hash {
            warn!(
                entity = P::ENTITY_TYPE,
                id = %id,
                claimed = %incoming.envelope.content_hash,
                recomputed = %recomputed,
                "incoming content hash does not match payload"
            );
            incoming.envelope.content_hash = recomputed;
        }

        let ctx = ReconcileContext {
            device_id: self.ctx.identity.current_device_id()?,
            equal_version_policy: self.ctx.config.equal_version_policy,
        };
        let server_version = incoming.envelope.server_version;

        let outcome = self.ctx.store.transact(id.as_bytes(), |current| {
            let local = current.map(StoredRecord::decode).transpose()?;
            let (write, outcome) = reconciler::reconcile(local.as_ref(), incoming, ctx)?;
            let write = match write {
                Some(row) => Write::Put(row.encode()?),
                None => Write::Keep,
            };
            Ok::<_, CoreError>((write, outcome))
        })?;

        if outcome.is_conflicted() {
            warn!(entity = P::ENTITY_TYPE, id = %id, server_version, "sync conflict detected");
        } else {
            debug!(
                entity = P::ENTITY_TYPE,
                id = %id,
                server_version,
                %outcome,
                "reconciled record"
            );
        }
        Ok(outcome)
    }

    /// Lists this type's pending records, oldest change first.
    pub fn list_pending(&self) -> PendingSet<S, Versioned<P>> {
        PendingSet::new(
            Arc::clone(&self.ctx.store),
            Some(P::ENTITY_TYPE.to_string()),
            StoredRecord::into_versioned::<P>,
        )
    }

    /// Returns the remote state held by a conflicted record, if any.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist, or a storage or
    /// codec error.
    pub fn conflict(&self, id: RecordId) -> CoreResult<Option<RemoteRecord<P>>> {
        let row = self.require(id)?;
        row.expect_type(P::ENTITY_TYPE)?;
        let Some(snapshot) = row.conflict_snapshot()? else {
            return Ok(None);
        };
        Ok(Some(snapshot.into_versioned::<P>()?.into()))
    }

    /// Settles a conflict.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the record is not conflicted,
    /// `NotFound` if it does not exist, or a storage, codec or device
    /// identity error.
    pub fn resolve_conflict(
        &self,
        id: RecordId,
        resolution: ConflictResolution,
    ) -> CoreResult<Versioned<P>> {
        let stamp = self.ctx.stamp()?;

        self.ctx.store.transact(id.as_bytes(), |current| {
            let existing = self.existing(id, current)?;
            let snapshot = reconciler::require_conflict(&existing)?;

            let row = match resolution {
                ConflictResolution::KeepLocal => {
                    let remote_version = snapshot.envelope.server_version;
                    let envelope = stamp_keep_local(&existing.envelope, remote_version, stamp);
                    StoredRecord {
                        envelope,
                        ..existing
                    }
                }
                ConflictResolution::AcceptRemote => reconciler::adopt(&existing, snapshot),
            };

            debug!(
                entity = P::ENTITY_TYPE,
                id = %id,
                ?resolution,
                server_version = row.envelope.server_version,
                "resolved conflict"
            );
            let bytes = row.encode()?;
            Ok((Write::Put(bytes), row.into_versioned()?))
        })
    }

    /// Packages a record the way a transport would push it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist, or a storage or
    /// codec error.
    pub fn to_remote(&self, id: RecordId) -> CoreResult<RemoteRecord<P>> {
        let mut record = self.require(id)?.into_versioned::<P>()?;
        record.envelope.conflict_payload = None;
        Ok(record.into())
    }

    fn remote_hash(&self, remote: &RemoteRecord<P>) -> CoreResult<ContentHash> {
        let payload_hash = self.hasher.hash(&remote.payload)?;
        Ok(seal(payload_hash, remote.envelope.is_tombstone()))
    }

    fn load(&self, id: RecordId) -> CoreResult<Option<StoredRecord>> {
        self.ctx
            .store
            .get(id.as_bytes())?
            .map(|bytes| StoredRecord::decode(&bytes))
            .transpose()
    }

    fn require(&self, id: RecordId) -> CoreResult<StoredRecord> {
        self.load(id)?
            .ok_or_else(|| CoreError::not_found(P::ENTITY_TYPE, id))
    }

    fn existing(&self, id: RecordId, current: Option<&[u8]>) -> CoreResult<StoredRecord> {
        let bytes = current.ok_or_else(|| CoreError::not_found(P::ENTITY_TYPE, id))?;
        let row = StoredRecord::decode(bytes)?;
        row.expect_type(P::ENTITY_TYPE)?;
        Ok(row)
    }
}
