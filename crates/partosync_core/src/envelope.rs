//! The per-record synchronization envelope.

use crate::id::{DeviceId, RecordId};
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Milliseconds since the Unix epoch.
pub type Millis = u64;

/// Synchronization state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Matches the state last acknowledged by the remote authority.
    Clean,
    /// Has local changes that were not pushed yet.
    Dirty,
    /// A local change raced a divergent remote change; needs resolution.
    Conflicted,
}

impl SyncStatus {
    /// Returns true if the record must be offered to the transport.
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncStatus::Dirty | SyncStatus::Conflicted)
    }

    /// Short lowercase name, as printed by tools.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Clean => "clean",
            SyncStatus::Dirty => "dirty",
            SyncStatus::Conflicted => "conflicted",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 digest of a record's business payload.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Creates a hash from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = deserializer.deserialize_bytes(BlobVisitor)?;
        <[u8; 32]>::try_from(bytes.as_slice())
            .map(Self)
            .map_err(|_| de::Error::invalid_length(bytes.len(), &"32 bytes"))
    }
}

/// Synchronization metadata carried by every persisted record.
///
/// Only the mutation coordinator and the reconciler write these fields;
/// callers read them.
///
/// # Invariants
///
/// - `local_version` starts at 1 and strictly increases on local mutations
/// - `updated_at >= created_at`
/// - `created_at` and `origin_device_id` never change after creation
/// - a tombstone (`deleted_at` set) keeps its envelope forever
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEnvelope {
    /// Globally unique, immutable record id.
    pub id: RecordId,
    /// Creation time; immutable.
    pub created_at: Millis,
    /// Time of the latest local or accepted remote mutation.
    pub updated_at: Millis,
    /// Deletion time; presence marks a tombstone.
    pub deleted_at: Option<Millis>,
    /// Device that performed the most recent mutation.
    pub device_id: DeviceId,
    /// Device that created the record; immutable.
    pub origin_device_id: DeviceId,
    /// Counter of accepted local mutations.
    pub local_version: u64,
    /// Last version acknowledged by the remote authority (0 = never synced).
    pub server_version: u64,
    /// Whether the record needs outbound synchronization.
    pub sync_status: SyncStatus,
    /// Digest of the business payload and tombstone state.
    pub content_hash: ContentHash,
    /// Encoded remote state that lost a conflict, kept for resolution.
    #[serde(with = "blob_option")]
    pub conflict_payload: Option<Vec<u8>>,
}

impl SyncEnvelope {
    /// Returns true if the record is soft-deleted.
    pub fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns true if the record is Dirty or Conflicted.
    pub fn is_pending(&self) -> bool {
        self.sync_status.is_pending()
    }

    /// Returns true if the record was never acknowledged by the remote.
    pub fn is_unsynced(&self) -> bool {
        self.server_version == 0
    }
}

/// Accepts CBOR byte strings, and arrays of small integers for tolerance.
struct BlobVisitor;

impl<'de> Visitor<'de> for BlobVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a byte string")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(b) = seq.next_element::<u8>()? {
            out.push(b);
        }
        Ok(out)
    }
}

/// `Option<Vec<u8>>` as an optional CBOR byte string.
mod blob_option {
    use super::BlobVisitor;
    use serde::{Deserializer, Serializer};

    struct Bytes<'a>(&'a [u8]);

    impl serde::Serialize for Bytes<'_> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_bytes(self.0)
        }
    }

    struct Blob(Vec<u8>);

    impl<'de> serde::Deserialize<'de> for Blob {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_bytes(BlobVisitor).map(Blob)
        }
    }

    pub(super) fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&Bytes(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let blob: Option<Blob> = serde::Deserialize::deserialize(deserializer)?;
        Ok(blob.map(|b| b.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SyncEnvelope {
        let device = DeviceId::from_bytes([2u8; 16]);
        SyncEnvelope {
            id: RecordId::from_bytes([1u8; 16]),
            created_at: 1_000,
            updated_at: 2_000,
            deleted_at: None,
            device_id: device,
            origin_device_id: device,
            local_version: 3,
            server_version: 1,
            sync_status: SyncStatus::Dirty,
            content_hash: ContentHash::from_bytes([9u8; 32]),
            conflict_payload: Some(vec![0xCA, 0xFE]),
        }
    }

    fn cbor_roundtrip(envelope: &SyncEnvelope) -> SyncEnvelope {
        let mut buf = Vec::new();
        ciborium::into_writer(envelope, &mut buf).unwrap();
        ciborium::from_reader(buf.as_slice()).unwrap()
    }

    #[test]
    fn envelope_survives_cbor() {
        let envelope = sample();
        assert_eq!(cbor_roundtrip(&envelope), envelope);

        let cleared = SyncEnvelope {
            conflict_payload: None,
            deleted_at: Some(3_000),
            ..envelope
        };
        assert_eq!(cbor_roundtrip(&cleared), cleared);
    }

    #[test]
    fn pending_statuses() {
        assert!(!SyncStatus::Clean.is_pending());
        assert!(SyncStatus::Dirty.is_pending());
        assert!(SyncStatus::Conflicted.is_pending());
    }

    #[test]
    fn tombstone_and_unsynced_flags() {
        let mut envelope = sample();
        assert!(!envelope.is_tombstone());
        assert!(!envelope.is_unsynced());

        envelope.deleted_at = Some(5);
        envelope.server_version = 0;
        assert!(envelope.is_tombstone());
        assert!(envelope.is_unsynced());
    }

    #[test]
    fn hash_hex_is_64_chars() {
        let hash = ContentHash::from_bytes([0xAB; 32]);
        assert_eq!(hash.to_hex().len(), 64);
        assert!(hash.to_string().starts_with("abab"));
    }
}
