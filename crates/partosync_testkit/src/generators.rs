//! Property-based test generators using proptest.
//!
//! Provides strategies for clinical payloads, local edit sequences and
//! incoming remote states.

use crate::fixtures::{
    Contraction, Intensity, Temperature, LOCAL_DEVICE, PEER_DEVICE, START_MILLIS,
};
use partosync_core::{
    seal, ContentHasher, DeviceId, Millis, RecordId, RemoteRecord, Sha256Hasher, SyncEntity,
    SyncEnvelope, SyncStatus,
};
use proptest::prelude::*;

/// Strategy for record ids.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    prop::array::uniform16(any::<u8>()).prop_map(RecordId::from_bytes)
}

/// Strategy for device ids, biased towards the two fixture devices.
pub fn device_id_strategy() -> impl Strategy<Value = DeviceId> {
    prop_oneof![
        Just(LOCAL_DEVICE),
        Just(PEER_DEVICE),
        prop::array::uniform16(any::<u8>()).prop_map(DeviceId::from_bytes),
    ]
}

/// Strategy for contraction intensities.
pub fn intensity_strategy() -> impl Strategy<Value = Intensity> {
    prop_oneof![
        Just(Intensity::Mild),
        Just(Intensity::Moderate),
        Just(Intensity::Strong),
    ]
}

/// Strategy for contractions.
pub fn contraction_strategy() -> impl Strategy<Value = Contraction> {
    (0u64..86_400_000, 10u32..180, intensity_strategy()).prop_map(
        |(offset, duration_secs, intensity)| Contraction {
            started_at: START_MILLIS + offset,
            duration_secs,
            intensity,
        },
    )
}

/// Strategy for temperatures. The value range is small so that equal
/// payloads, and therefore unchanged saves, come up regularly.
pub fn temperature_strategy() -> impl Strategy<Value = Temperature> {
    (360i16..364, prop_oneof![Just("oral"), Just("axillary")]).prop_map(
        |(tenths_celsius, site)| Temperature {
            tenths_celsius,
            site: site.to_string(),
        },
    )
}

/// A local action on an existing record.
#[derive(Debug, Clone)]
pub enum LocalOp<P> {
    /// Save a new payload.
    Update(P),
    /// Soft-delete the record.
    Delete,
    /// Let time pass before the next action.
    Wait(Millis),
}

/// Strategy for sequences of local actions.
pub fn local_ops_strategy<P, S>(
    payload: S,
    max_len: usize,
) -> impl Strategy<Value = Vec<LocalOp<P>>>
where
    P: Clone + std::fmt::Debug,
    S: Strategy<Value = P>,
{
    let op = prop_oneof![
        6 => payload.prop_map(LocalOp::Update),
        1 => Just(LocalOp::Delete),
        2 => (1u64..60_000).prop_map(LocalOp::Wait),
    ];
    prop::collection::vec(op, 0..max_len)
}

/// Shape of an incoming remote state relative to a local record.
#[derive(Debug, Clone)]
pub struct RemoteShape<P> {
    /// Payload the authority holds.
    pub payload: P,
    /// Server version it carries.
    pub server_version: u64,
    /// Device that last wrote it.
    pub device_id: DeviceId,
    /// Local version claimed by that device.
    pub local_version: u64,
    /// Whether it is a tombstone.
    pub deleted: bool,
}

impl<P: SyncEntity> RemoteShape<P> {
    /// Builds the incoming record for `base`, the envelope of a record the
    /// authority already knows. The content hash is computed correctly.
    pub fn to_remote(&self, base: &SyncEnvelope) -> RemoteRecord<P> {
        let payload_hash = Sha256Hasher
            .hash(&self.payload)
            .expect("Fixture payloads always encode");
        let updated_at = base.updated_at + 1_000;
        let envelope = SyncEnvelope {
            updated_at,
            deleted_at: self.deleted.then_some(updated_at),
            device_id: self.device_id,
            local_version: self.local_version,
            server_version: self.server_version,
            sync_status: SyncStatus::Clean,
            content_hash: seal(payload_hash, self.deleted),
            conflict_payload: None,
            ..base.clone()
        };
        RemoteRecord::new(envelope, self.payload.clone())
    }
}

/// Strategy for incoming remote states.
pub fn remote_shape_strategy<P, S>(payload: S) -> impl Strategy<Value = RemoteShape<P>>
where
    P: Clone + std::fmt::Debug,
    S: Strategy<Value = P>,
{
    let versions = (0u64..6, 1u64..8);
    (payload, versions, device_id_strategy(), prop::bool::weighted(0.2)).prop_map(
        |(payload, (server_version, local_version), device_id, deleted)| RemoteShape {
            payload,
            server_version,
            device_id,
            local_version,
            deleted,
        },
    )
}
