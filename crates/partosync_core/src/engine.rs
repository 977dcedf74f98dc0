//! Sync engine entry point.

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::coordinator::Stamp;
use crate::entity::SyncEntity;
use crate::envelope::SyncStatus;
use crate::error::CoreResult;
use crate::hash::{ContentHasher, Sha256Hasher};
use crate::id::DeviceId;
use crate::identity::{DeviceIdentityProvider, StoredDeviceIdentity};
use crate::pending::PendingSet;
use crate::record::StoredRecord;
use crate::repository::SyncRepository;
use crate::stats::SyncStats;
use partosync_storage::RecordStore;
use std::sync::Arc;
use tracing::info;

/// Collaborators shared by the engine and every repository it hands out.
pub(crate) struct EngineContext<S> {
    pub(crate) store: Arc<S>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) identity: Arc<dyn DeviceIdentityProvider>,
    pub(crate) config: EngineConfig,
}

impl<S> Clone for EngineContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            identity: Arc::clone(&self.identity),
            config: self.config.clone(),
        }
    }
}

impl<S: RecordStore> EngineContext<S> {
    /// Reads the current device and time for one mutation.
    pub(crate) fn stamp(&self) -> CoreResult<Stamp> {
        let device_id = self.identity.current_device_id()?;
        Ok(Stamp::new(device_id, self.clock.now_millis()))
    }

    /// Decodes every row in the store.
    pub(crate) fn rows(&self) -> CoreResult<Vec<StoredRecord>> {
        self.store
            .scan()?
            .iter()
            .map(|(_, bytes)| StoredRecord::decode(bytes))
            .collect()
    }
}

/// The sync engine.
///
/// Owns the record store and the injected clock and device identity, and
/// hands out typed [`SyncRepository`] handles, one per entity type. All
/// handles share the same store, so a single engine serves every clinical
/// measurement type.
///
/// # Example
///
/// ```rust
/// use partosync_core::{ManualClock, SyncEngine, SyncEntity, SyncStatus};
/// use partosync_storage::InMemoryStore;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Contraction {
///     duration_secs: u32,
///     strength: String,
/// }
///
/// impl SyncEntity for Contraction {
///     const ENTITY_TYPE: &'static str = "contraction";
/// }
///
/// let engine = SyncEngine::builder(InMemoryStore::new())
///     .clock(ManualClock::new(1_000))
///     .build()
///     .unwrap();
///
/// let contractions = engine.repository::<Contraction>();
/// let record = contractions
///     .create(Contraction { duration_secs: 45, strength: "moderate".into() })
///     .unwrap();
///
/// assert_eq!(record.envelope.local_version, 1);
/// assert_eq!(record.envelope.sync_status, SyncStatus::Dirty);
/// ```
pub struct SyncEngine<S> {
    ctx: EngineContext<S>,
}

impl<S: RecordStore + 'static> SyncEngine<S> {
    /// Starts building an engine over `store`.
    pub fn builder(store: S) -> SyncEngineBuilder<S> {
        SyncEngineBuilder::new(Arc::new(store))
    }

    /// Starts building an engine over a store that is shared elsewhere.
    pub fn builder_shared(store: Arc<S>) -> SyncEngineBuilder<S> {
        SyncEngineBuilder::new(store)
    }
}

impl<S: RecordStore> SyncEngine<S> {
    /// Returns the id of the current device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceIdentity` if the identity provider fails.
    pub fn device_id(&self) -> CoreResult<DeviceId> {
        self.ctx.identity.current_device_id()
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.ctx.store
    }

    /// Returns a repository for `P` using the default SHA-256 hasher.
    pub fn repository<P: SyncEntity>(&self) -> SyncRepository<P, S> {
        SyncRepository::new(self.ctx.clone(), Sha256Hasher)
    }

    /// Returns a repository for `P` using a custom content hasher.
    pub fn repository_with_hasher<P, H>(&self, hasher: H) -> SyncRepository<P, S, H>
    where
        P: SyncEntity,
        H: ContentHasher<P>,
    {
        SyncRepository::new(self.ctx.clone(), hasher)
    }

    /// Lists pending records of every type, or of one entity type.
    pub fn list_pending(&self, entity_type: Option<&str>) -> PendingSet<S, StoredRecord> {
        PendingSet::new(
            Arc::clone(&self.ctx.store),
            entity_type.map(String::from),
            Ok,
        )
    }

    /// Returns every Conflicted record, oldest change first.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error if the store cannot be read.
    pub fn conflicts(&self) -> CoreResult<Vec<StoredRecord>> {
        let mut rows: Vec<_> = self
            .ctx
            .rows()?
            .into_iter()
            .filter(|row| row.envelope.sync_status == SyncStatus::Conflicted)
            .collect();
        rows.sort_by_key(|row| (row.envelope.updated_at, row.envelope.id));
        Ok(rows)
    }

    /// Counts records per entity type and sync state.
    ///
    /// # Errors
    ///
    /// Returns a storage or codec error if the store cannot be read.
    pub fn stats(&self) -> CoreResult<SyncStats> {
        let mut stats = SyncStats::default();
        for row in self.ctx.rows()? {
            stats.record(&row);
        }
        Ok(stats)
    }

    /// Flushes buffered writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the flush fails.
    pub fn flush(&self) -> CoreResult<()> {
        self.ctx.store.flush()?;
        Ok(())
    }
}

/// Builder for [`SyncEngine`].
///
/// Defaults: [`SystemClock`], a device id persisted in the store's
/// metadata, and [`EngineConfig::default`].
pub struct SyncEngineBuilder<S> {
    store: Arc<S>,
    clock: Option<Arc<dyn Clock>>,
    identity: Option<Arc<dyn DeviceIdentityProvider>>,
    config: EngineConfig,
}

impl<S: RecordStore + 'static> SyncEngineBuilder<S> {
    fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: None,
            identity: None,
            config: EngineConfig::default(),
        }
    }

    /// Sets the clock.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Sets the device identity provider.
    #[must_use]
    pub fn device_identity(mut self, identity: impl DeviceIdentityProvider + 'static) -> Self {
        self.identity = Some(Arc::new(identity));
        self
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the engine.
    ///
    /// The device id is resolved here, so a store that cannot hold one
    /// fails fast instead of on the first save.
    ///
    /// # Errors
    ///
    /// Returns `DeviceIdentity` if the device id cannot be loaded or
    /// created, or a storage error if the store cannot be read.
    pub fn build(self) -> CoreResult<SyncEngine<S>> {
        let identity: Arc<dyn DeviceIdentityProvider> = match self.identity {
            Some(identity) => identity,
            None => Arc::new(StoredDeviceIdentity::new(Arc::clone(&self.store))),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        let device_id = identity.current_device_id()?;
        let records = self.store.len()?;
        info!(device_id = %device_id, records, "sync engine ready");

        Ok(SyncEngine {
            ctx: EngineContext {
                store: self.store,
                clock,
                identity,
                config: self.config,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::CoreError;
    use crate::identity::FixedDeviceIdentity;
    use partosync_storage::InMemoryStore;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Temperature {
        tenths_celsius: i32,
    }

    impl SyncEntity for Temperature {
        const ENTITY_TYPE: &'static str = "temperature";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pulse {
        bpm: u16,
    }

    impl SyncEntity for Pulse {
        const ENTITY_TYPE: &'static str = "pulse";
    }

    struct BrokenIdentity;

    impl DeviceIdentityProvider for BrokenIdentity {
        fn current_device_id(&self) -> CoreResult<DeviceId> {
            Err(CoreError::device_identity("keystore offline"))
        }
    }

    fn engine() -> SyncEngine<InMemoryStore> {
        SyncEngine::builder(InMemoryStore::new())
            .clock(ManualClock::new(1_000))
            .device_identity(FixedDeviceIdentity::new(DeviceId::from_bytes([1; 16])))
            .build()
            .unwrap()
    }

    #[test]
    fn default_identity_is_persisted_in_store() {
        let store = Arc::new(InMemoryStore::new());
        let first = SyncEngine::builder_shared(Arc::clone(&store))
            .build()
            .unwrap()
            .device_id()
            .unwrap();
        let second = SyncEngine::builder_shared(store)
            .build()
            .unwrap()
            .device_id()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn identity_failure_is_fatal_at_build() {
        let result = SyncEngine::builder(InMemoryStore::new())
            .device_identity(BrokenIdentity)
            .build();
        assert!(matches!(result, Err(CoreError::DeviceIdentity { .. })));
    }

    #[test]
    fn pending_spans_entity_types() {
        let engine = engine();
        engine
            .repository::<Temperature>()
            .create(Temperature { tenths_celsius: 371 })
            .unwrap();
        engine.repository::<Pulse>().create(Pulse { bpm: 88 }).unwrap();

        assert_eq!(engine.list_pending(None).iter().count(), 2);
        let pulses: Vec<_> = engine
            .list_pending(Some("pulse"))
            .iter()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(pulses.len(), 1);
        assert_eq!(pulses[0].entity_type, "pulse");
    }

    #[test]
    fn stats_count_per_type() {
        let engine = engine();
        let temps = engine.repository::<Temperature>();
        let a = temps.create(Temperature { tenths_celsius: 368 }).unwrap();
        temps.create(Temperature { tenths_celsius: 372 }).unwrap();
        temps.delete(a.id()).unwrap();
        engine.repository::<Pulse>().create(Pulse { bpm: 90 }).unwrap();

        let stats = engine.stats().unwrap();
        let t = stats.get("temperature").unwrap();
        assert_eq!(t.total, 2);
        assert_eq!(t.active, 1);
        assert_eq!(t.tombstoned, 1);
        assert_eq!(t.dirty, 2);
        assert_eq!(stats.get("pulse").unwrap().total, 1);
        assert_eq!(stats.totals().total, 3);
    }

    #[test]
    fn empty_engine_has_no_conflicts() {
        let engine = engine();
        assert!(engine.conflicts().unwrap().is_empty());
        assert!(engine.stats().unwrap().is_empty());
    }
}
