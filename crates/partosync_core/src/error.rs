//! Error types for partosync core.

use crate::id::RecordId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in sync core operations.
///
/// A detected conflict is not an error: it is reported as
/// [`crate::ReconcileOutcome::Conflicted`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// A mutation targeted a record that does not exist.
    #[error("record not found: {id} ({entity_type})")]
    NotFound {
        /// Entity type the caller asked for.
        entity_type: String,
        /// The missing record.
        id: RecordId,
    },

    /// Storage backend error. The mutation was not applied.
    #[error("storage error: {0}")]
    Storage(#[from] partosync_storage::StorageError),

    /// A record or payload could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The device identity could not be loaded or created.
    #[error("device identity unavailable: {message}")]
    DeviceIdentity {
        /// Description of the failure.
        message: String,
    },

    /// A record exists but belongs to a different entity type.
    #[error("record {id} is a {found}, not a {expected}")]
    EntityTypeMismatch {
        /// The record.
        id: RecordId,
        /// Entity type the caller asked for.
        expected: String,
        /// Entity type stored with the record.
        found: String,
    },

    /// Operation not permitted in the record's current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(entity_type: impl Into<String>, id: RecordId) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id,
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a device identity error.
    pub fn device_identity(message: impl Into<String>) -> Self {
        Self::DeviceIdentity {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the error came from the storage layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
