//! Content hashing.
//!
//! The content hash distinguishes genuine changes from no-op saves and
//! tells the reconciler whether a dirty local write and an incoming remote
//! write agree.

use crate::envelope::ContentHash;
use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Domain separator mixed into the hash of soft-deleted records.
const TOMBSTONE_DOMAIN: &[u8] = b"partosync/tombstone/v1";

/// Computes a deterministic digest over an entity's business fields.
///
/// Implementations must return identical hashes for equal payloads on
/// every device.
pub trait ContentHasher<P>: Send + Sync {
    /// Hashes the payload.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the payload cannot be encoded.
    fn hash(&self, payload: &P) -> CoreResult<ContentHash>;
}

/// SHA-256 over the CBOR encoding of the payload.
///
/// Payload types must serialize deterministically: struct fields are
/// emitted in declaration order, and maps should be `BTreeMap`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl<P: Serialize> ContentHasher<P> for Sha256Hasher {
    fn hash(&self, payload: &P) -> CoreResult<ContentHash> {
        let mut encoded = Vec::new();
        ciborium::into_writer(payload, &mut encoded)
            .map_err(|e| CoreError::codec(format!("cannot encode payload for hashing: {e}")))?;
        Ok(ContentHash::from_bytes(Sha256::digest(&encoded).into()))
    }
}

/// Adapts a closure into a [`ContentHasher`].
///
/// Useful when only some fields of a payload count as business content.
pub struct FnHasher<F>(pub F);

impl<P, F> ContentHasher<P> for FnHasher<F>
where
    F: Fn(&P) -> ContentHash + Send + Sync,
{
    fn hash(&self, payload: &P) -> CoreResult<ContentHash> {
        Ok((self.0)(payload))
    }
}

/// Folds the tombstone state into a payload hash.
///
/// A soft delete must look like a content change, otherwise a pending
/// local delete would be "merged" away by an incoming live copy of the
/// same payload.
pub fn seal(payload_hash: ContentHash, deleted: bool) -> ContentHash {
    if !deleted {
        return payload_hash;
    }
    let mut hasher = Sha256::new();
    hasher.update(TOMBSTONE_DOMAIN);
    hasher.update(payload_hash.as_bytes());
    ContentHash::from_bytes(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Reading {
        value: i64,
        unit: String,
    }

    fn reading(value: i64) -> Reading {
        Reading {
            value,
            unit: "bpm".into(),
        }
    }

    #[test]
    fn equal_payloads_hash_equal() {
        let a = Sha256Hasher.hash(&reading(140)).unwrap();
        let b = Sha256Hasher.hash(&reading(140)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_payloads_hash_differently() {
        let a = Sha256Hasher.hash(&reading(140)).unwrap();
        let b = Sha256Hasher.hash(&reading(141)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn btree_maps_are_order_independent() {
        let mut first = BTreeMap::new();
        first.insert("b", 2);
        first.insert("a", 1);
        let mut second = BTreeMap::new();
        second.insert("a", 1);
        second.insert("b", 2);

        assert_eq!(
            Sha256Hasher.hash(&first).unwrap(),
            Sha256Hasher.hash(&second).unwrap()
        );
    }

    #[test]
    fn seal_only_changes_tombstones() {
        let base = Sha256Hasher.hash(&reading(120)).unwrap();
        assert_eq!(seal(base, false), base);
        assert_ne!(seal(base, true), base);
        assert_eq!(seal(base, true), seal(base, true));
    }

    #[test]
    fn fn_hasher_uses_closure() {
        let hasher = FnHasher(|r: &Reading| ContentHash::from_bytes([r.value as u8; 32]));
        assert_eq!(
            hasher.hash(&reading(7)).unwrap(),
            ContentHash::from_bytes([7u8; 32])
        );
    }
}
