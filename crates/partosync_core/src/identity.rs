//! Device identity.
//!
//! Every mutation is stamped with the id of the device that made it. The
//! id is generated once per installation and persisted next to the data,
//! so it survives restarts and is never regenerated.

use crate::error::{CoreError, CoreResult};
use crate::id::DeviceId;
use partosync_storage::RecordStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Metadata key holding the persisted device id.
pub const DEVICE_ID_META: &str = "device_id";

/// Supplies the identifier of the current device.
///
/// Injected into the engine instead of read from a global, so tests can
/// pin the id.
pub trait DeviceIdentityProvider: Send + Sync {
    /// Returns the current device id, creating and persisting it on first use.
    ///
    /// # Errors
    ///
    /// Returns `DeviceIdentity` if durable storage is unavailable.
    fn current_device_id(&self) -> CoreResult<DeviceId>;
}

/// A device id fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct FixedDeviceIdentity(DeviceId);

impl FixedDeviceIdentity {
    /// Creates a provider that always returns `id`.
    pub fn new(id: DeviceId) -> Self {
        Self(id)
    }
}

impl DeviceIdentityProvider for FixedDeviceIdentity {
    fn current_device_id(&self) -> CoreResult<DeviceId> {
        Ok(self.0)
    }
}

/// A device id persisted in the record store's metadata.
///
/// The first call generates a random id and writes it with
/// [`RecordStore::put_meta_if_absent`]; later calls return the cached value.
pub struct StoredDeviceIdentity<S: RecordStore> {
    store: Arc<S>,
    cached: RwLock<Option<DeviceId>>,
}

impl<S: RecordStore> StoredDeviceIdentity<S> {
    /// Creates a provider backed by `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cached: RwLock::new(None),
        }
    }

    fn load_or_create(&self) -> CoreResult<DeviceId> {
        let candidate = DeviceId::new();
        let stored = self
            .store
            .put_meta_if_absent(DEVICE_ID_META, candidate.as_bytes())
            .map_err(|e| CoreError::device_identity(e.to_string()))?;

        let id = DeviceId::from_slice(&stored).ok_or_else(|| {
            CoreError::device_identity(format!(
                "stored device id has {} bytes, expected 16",
                stored.len()
            ))
        })?;

        if id == candidate {
            info!(device_id = %id, "generated new device identity");
        }
        Ok(id)
    }
}

impl<S: RecordStore> DeviceIdentityProvider for StoredDeviceIdentity<S> {
    fn current_device_id(&self) -> CoreResult<DeviceId> {
        if let Some(id) = *self.cached.read() {
            return Ok(id);
        }

        let mut cached = self.cached.write();
        if let Some(id) = *cached {
            return Ok(id);
        }
        let id = self.load_or_create()?;
        *cached = Some(id);
        Ok(id)
    }
}

impl<P: DeviceIdentityProvider + ?Sized> DeviceIdentityProvider for Arc<P> {
    fn current_device_id(&self) -> CoreResult<DeviceId> {
        (**self).current_device_id()
    }
}
