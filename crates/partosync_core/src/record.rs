//! Persisted row format.
//!
//! Every record is stored as one CBOR map holding the entity type, the
//! envelope and the payload. The payload stays a self-describing CBOR
//! value so tools can read rows without knowing the payload type.

use crate::entity::{RemoteRecord, SyncEntity, Versioned};
use crate::envelope::SyncEnvelope;
use crate::error::{CoreError, CoreResult};
use ciborium::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One persisted row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Entity type name (see [`SyncEntity::ENTITY_TYPE`]).
    pub entity_type: String,
    /// Synchronization metadata.
    pub envelope: SyncEnvelope,
    /// Business payload as a CBOR value.
    pub payload: Value,
}

impl StoredRecord {
    /// Builds a row from a typed payload.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the payload cannot be serialized.
    pub fn from_typed<P: SyncEntity>(envelope: SyncEnvelope, payload: &P) -> CoreResult<Self> {
        let payload = Value::serialized(payload)
            .map_err(|e| CoreError::codec(format!("cannot encode {}: {e}", P::ENTITY_TYPE)))?;
        Ok(Self {
            entity_type: P::ENTITY_TYPE.to_string(),
            envelope,
            payload,
        })
    }

    /// Builds a row from a remote record.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the payload cannot be serialized.
    pub fn from_remote<P: SyncEntity>(remote: &RemoteRecord<P>) -> CoreResult<Self> {
        Self::from_typed(remote.envelope.clone(), &remote.payload)
    }

    /// Encodes the row.
    ///
    /// # Errors
    ///
    /// Returns a codec error if encoding fails.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::codec(format!("cannot encode record: {e}")))?;
        Ok(buf)
    }

    /// Decodes a row.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the bytes are not a valid row.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(bytes)
            .map_err(|e| CoreError::codec(format!("cannot decode record: {e}")))
    }

    /// Fails unless the row holds the expected entity type.
    ///
    /// # Errors
    ///
    /// Returns `EntityTypeMismatch` on a different entity type.
    pub fn expect_type(&self, expected: &str) -> CoreResult<()> {
        if self.entity_type == expected {
            Ok(())
        } else {
            Err(CoreError::EntityTypeMismatch {
                id: self.envelope.id,
                expected: expected.to_string(),
                found: self.entity_type.clone(),
            })
        }
    }

    /// Decodes the payload into a concrete type.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the payload does not match `P`.
    pub fn payload_as<P: DeserializeOwned>(&self) -> CoreResult<P> {
        self.payload.deserialized().map_err(|e| {
            CoreError::codec(format!(
                "cannot decode {} payload of {}: {e}",
                self.entity_type, self.envelope.id
            ))
        })
    }

    /// Converts into a typed view, checking the entity type.
    ///
    /// # Errors
    ///
    /// Returns `EntityTypeMismatch` or a codec error.
    pub fn into_versioned<P: SyncEntity>(self) -> CoreResult<Versioned<P>> {
        self.expect_type(P::ENTITY_TYPE)?;
        let payload = self.payload_as::<P>()?;
        Ok(Versioned {
            envelope: self.envelope,
            payload,
        })
    }

    /// Decodes the remote state held in `conflict_payload`, if any.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the snapshot is unreadable.
    pub fn conflict_snapshot(&self) -> CoreResult<Option<StoredRecord>> {
        self.envelope
            .conflict_payload
            .as_deref()
            .map(StoredRecord::decode)
            .transpose()
    }
}
