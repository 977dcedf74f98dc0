//! Entity adapter and typed record views.

use crate::envelope::SyncEnvelope;
use crate::id::RecordId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A payload type that can be stored and synchronized.
///
/// One implementation per clinical measurement type replaces a whole
/// hand-written repository class: the engine handles the envelope, the
/// implementor only names its entity type and derives serde.
///
/// # Example
///
/// ```rust
/// use partosync_core::SyncEntity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Temperature {
///     celsius_tenths: i32,
///     site: String,
/// }
///
/// impl SyncEntity for Temperature {
///     const ENTITY_TYPE: &'static str = "temperature";
/// }
/// ```
pub trait SyncEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable name of the entity type, stored with every record.
    const ENTITY_TYPE: &'static str;
}

/// A stored record: envelope plus decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<P> {
    /// Synchronization metadata.
    pub envelope: SyncEnvelope,
    /// Business payload.
    pub payload: P,
}

impl<P> Versioned<P> {
    /// Returns the record id.
    pub fn id(&self) -> RecordId {
        self.envelope.id
    }

    /// Returns true if the record is soft-deleted.
    pub fn is_tombstone(&self) -> bool {
        self.envelope.is_tombstone()
    }
}

/// A record state as sent or received by the remote authority.
///
/// Used both for server-originated pulls and for push acknowledgments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord<P> {
    /// Envelope as known to the remote authority.
    pub envelope: SyncEnvelope,
    /// Payload as known to the remote authority.
    pub payload: P,
}

impl<P> RemoteRecord<P> {
    /// Creates a remote record.
    pub fn new(envelope: SyncEnvelope, payload: P) -> Self {
        Self { envelope, payload }
    }

    /// Returns the record id.
    pub fn id(&self) -> RecordId {
        self.envelope.id
    }
}

impl<P> From<Versioned<P>> for RemoteRecord<P> {
    fn from(record: Versioned<P>) -> Self {
        Self {
            envelope: record.envelope,
            payload: record.payload,
        }
    }
}
