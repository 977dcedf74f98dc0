//! # partosync core
//!
//! Per-record synchronization engine for local-first clinical data entry.
//!
//! Every persisted record carries a [`SyncEnvelope`]: timestamps, the
//! creating and last-writing device, a local version counter, the last
//! server version acknowledged by the remote authority, a soft-delete
//! tombstone and a content hash. This crate provides:
//! - Local mutation rules that stamp the envelope on create, update and delete
//! - Remote reconciliation with version-gated last-writer-wins and explicit
//!   conflict detection
//! - A persisted device identity
//! - A lazy, restartable enumeration of records awaiting push
//!
//! One generic [`SyncRepository`] serves every measurement type; a payload
//! type only needs serde and a [`SyncEntity`] impl.
//!
//! ## Key Invariants
//!
//! - `local_version` starts at 1 and grows by one per local mutation
//! - `updated_at` never precedes `created_at`
//! - Records are never physically removed; deletion is a tombstone
//! - A pending local edit is never overwritten by a divergent remote state
//! - Every mutation is one atomic read-modify-write on its record
//!
//! Network transport is not part of this crate. A sync process pushes what
//! [`SyncRepository::list_pending`] yields and feeds every server response
//! back through [`SyncRepository::reconcile`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod coordinator;
mod engine;
mod entity;
mod envelope;
mod error;
mod hash;
mod id;
mod identity;
mod pending;
mod reconciler;
mod record;
mod repository;
mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, EqualVersionPolicy, SavePolicy};
pub use coordinator::{stamp_create, stamp_delete, stamp_keep_local, stamp_update, Stamp};
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use entity::{RemoteRecord, SyncEntity, Versioned};
pub use envelope::{ContentHash, Millis, SyncEnvelope, SyncStatus};
pub use error::{CoreError, CoreResult};
pub use hash::{seal, ContentHasher, FnHasher, Sha256Hasher};
pub use id::{DeviceId, RecordId};
pub use identity::{
    DeviceIdentityProvider, FixedDeviceIdentity, StoredDeviceIdentity, DEVICE_ID_META,
};
pub use pending::{PendingIter, PendingSet};
pub use reconciler::{reconcile, AcceptKind, ReconcileContext, ReconcileOutcome, RejectReason};
pub use record::StoredRecord;
pub use repository::{ConflictResolution, SyncRepository};
pub use stats::{EntityStats, SyncStats};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
