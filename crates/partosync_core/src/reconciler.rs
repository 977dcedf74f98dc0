//! Remote reconciliation rules.
//!
//! Decides what happens to the local row when a record state arrives from
//! the remote authority, either as a pull result or as the acknowledgment
//! of a push. Version-gated last-writer-wins, except that an unsynced local
//! edit is never overwritten by a divergent remote state: that case is
//! surfaced as a conflict instead.

use crate::config::EqualVersionPolicy;
use crate::envelope::{SyncEnvelope, SyncStatus};
use crate::error::{CoreError, CoreResult};
use crate::id::DeviceId;
use crate::record::StoredRecord;
use std::fmt;

/// How an incoming state was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptKind {
    /// No local row existed; the incoming state was inserted.
    Inserted,
    /// A clean local row was replaced by the incoming state.
    Overwritten,
    /// A pending local edit agreed with the incoming state.
    Merged,
    /// The incoming state acknowledges an earlier push from this device
    /// that has since been edited again. Only the server version moved.
    Acknowledged,
}

/// Why an incoming state was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The incoming server version is older than what is stored locally.
    Stale,
    /// The incoming server version is already applied.
    AlreadyApplied,
}

/// Result of reconciling one incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The incoming state was applied.
    Accepted(AcceptKind),
    /// The incoming state was ignored; local state is unchanged.
    Rejected(RejectReason),
    /// A pending local edit diverges from the incoming state. The local
    /// state is kept and the incoming state is held for resolution.
    Conflicted,
}

impl ReconcileOutcome {
    /// Returns true if the incoming state was applied.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Returns true if a conflict was detected.
    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted)
    }

    /// Short name for logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted(AcceptKind::Inserted) => "inserted",
            Self::Accepted(AcceptKind::Overwritten) => "overwritten",
            Self::Accepted(AcceptKind::Merged) => "merged",
            Self::Accepted(AcceptKind::Acknowledged) => "acknowledged",
            Self::Rejected(RejectReason::Stale) => "stale",
            Self::Rejected(RejectReason::AlreadyApplied) => "already-applied",
            Self::Conflicted => "conflicted",
        }
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context a reconciliation runs in.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileContext {
    /// The current device.
    pub device_id: DeviceId,
    /// Treatment of equal server versions on clean rows.
    pub equal_version_policy: EqualVersionPolicy,
}

/// Reconciles `incoming` against the stored row.
///
/// `incoming` must already carry its locally recomputed content hash.
/// Returns the row to persist (`None` leaves storage untouched) and the
/// outcome.
///
/// # Errors
///
/// Returns `EntityTypeMismatch` if the stored row has another entity type,
/// or a codec error if a conflict snapshot cannot be encoded or decoded.
pub fn reconcile(
    local: Option<&StoredRecord>,
    incoming: StoredRecord,
    ctx: ReconcileContext,
) -> CoreResult<(Option<StoredRecord>, ReconcileOutcome)> {
    let incoming = strip(incoming);

    let Some(local) = local else {
        let mut row = incoming;
        row.envelope.sync_status = SyncStatus::Clean;
        row.envelope.updated_at = row.envelope.updated_at.max(row.envelope.created_at);
        return Ok((Some(row), ReconcileOutcome::Accepted(AcceptKind::Inserted)));
    };

    local.expect_type(&incoming.entity_type)?;
    let current = &local.envelope;
    let remote = &incoming.envelope;

    if remote.server_version < current.server_version {
        return Ok((None, ReconcileOutcome::Rejected(RejectReason::Stale)));
    }

    if !current.is_pending() {
        if remote.server_version == current.server_version
            && (ctx.equal_version_policy == EqualVersionPolicy::Ignore
                || remote.content_hash == current.content_hash)
        {
            return Ok((None, ReconcileOutcome::Rejected(RejectReason::AlreadyApplied)));
        }
        let row = adopt(local, incoming);
        return Ok((Some(row), ReconcileOutcome::Accepted(AcceptKind::Overwritten)));
    }

    if remote.content_hash == current.content_hash {
        // The local edit stands; only its sync state moves
        let mut row = local.clone();
        row.envelope.server_version = current.server_version.max(remote.server_version);
        row.envelope.sync_status = SyncStatus::Clean;
        row.envelope.conflict_payload = None;
        return Ok((Some(row), ReconcileOutcome::Accepted(AcceptKind::Merged)));
    }

    if remote.device_id == ctx.device_id && remote.local_version < current.local_version {
        let mut row = local.clone();
        row.envelope.server_version = remote.server_version;
        return Ok((Some(row), ReconcileOutcome::Accepted(AcceptKind::Acknowledged)));
    }

    if let Some(held) = local.conflict_snapshot()? {
        if remote.server_version < held.envelope.server_version {
            return Ok((None, ReconcileOutcome::Rejected(RejectReason::Stale)));
        }
    }

    let mut row = local.clone();
    row.envelope.sync_status = SyncStatus::Conflicted;
    row.envelope.conflict_payload = Some(incoming.encode()?);
    Ok((Some(row), ReconcileOutcome::Conflicted))
}

/// Drops fields that are local bookkeeping only.
fn strip(mut incoming: StoredRecord) -> StoredRecord {
    incoming.envelope.conflict_payload = None;
    incoming
}

/// Replaces the local row with the remote state, keeping local-only history.
pub(crate) fn adopt(local: &StoredRecord, remote: StoredRecord) -> StoredRecord {
    let current = &local.envelope;
    let envelope = SyncEnvelope {
        id: current.id,
        created_at: current.created_at,
        updated_at: remote.envelope.updated_at.max(current.created_at),
        deleted_at: remote.envelope.deleted_at,
        device_id: remote.envelope.device_id,
        origin_device_id: current.origin_device_id,
        local_version: current.local_version,
        server_version: current.server_version.max(remote.envelope.server_version),
        sync_status: SyncStatus::Clean,
        content_hash: remote.envelope.content_hash,
        conflict_payload: None,
    };
    StoredRecord {
        entity_type: local.entity_type.clone(),
        envelope,
        payload: remote.payload,
    }
}

/// Fails unless `row` holds a conflict snapshot.
pub(crate) fn require_conflict(row: &StoredRecord) -> CoreResult<StoredRecord> {
    if row.envelope.sync_status != SyncStatus::Conflicted {
        return Err(CoreError::invalid_operation(format!(
            "record {} is {}, not conflicted",
            row.envelope.id, row.envelope.sync_status
        )));
    }
    row.conflict_snapshot()?.ok_or_else(|| {
        CoreError::invalid_operation(format!(
            "record {} is conflicted but holds no remote snapshot",
            row.envelope.id
        ))
    })
}
