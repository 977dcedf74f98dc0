//! Test fixtures and engine helpers.
//!
//! Provides the clinical payload types used across the test suites and a
//! [`TestEngine`] with a pinned device id and a manually driven clock.

use partosync_core::{
    DeviceId, EngineConfig, FixedDeviceIdentity, ManualClock, Millis, SyncEngine, SyncEntity,
};
use partosync_storage::{FileStore, InMemoryStore, RecordStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Device id used by the engine under test.
pub const LOCAL_DEVICE: DeviceId = DeviceId::from_bytes([0x10; 16]);

/// Device id used for edits made by another tablet on the ward.
pub const PEER_DEVICE: DeviceId = DeviceId::from_bytes([0x20; 16]);

/// Clock reading every test engine starts at.
pub const START_MILLIS: Millis = 1_700_000_000_000;

/// Strength of a uterine contraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intensity {
    /// Mild.
    Mild,
    /// Moderate.
    Moderate,
    /// Strong.
    Strong,
}

/// A recorded contraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contraction {
    /// Onset, milliseconds since epoch.
    pub started_at: Millis,
    /// Duration in seconds.
    pub duration_secs: u32,
    /// Palpated strength.
    pub intensity: Intensity,
}

impl SyncEntity for Contraction {
    const ENTITY_TYPE: &'static str = "contraction";
}

/// A fetal heart rate observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetalHeartRate {
    /// Beats per minute.
    pub bpm: u16,
    /// How the rate was taken, e.g. "doppler" or "pinard".
    pub method: String,
}

impl SyncEntity for FetalHeartRate {
    const ENTITY_TYPE: &'static str = "fetal_heart_rate";
}

/// A vaginal examination finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CervixDilation {
    /// Dilation in centimetres.
    pub centimetres: u8,
    /// Effacement in percent.
    pub effacement_percent: u8,
    /// Station of the presenting part, -3 to +3.
    pub station: i8,
}

impl SyncEntity for CervixDilation {
    const ENTITY_TYPE: &'static str = "cervix_dilation";
}

/// Maternal temperature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Temperature {
    /// Tenths of a degree Celsius.
    pub tenths_celsius: i16,
    /// Measurement site.
    pub site: String,
}

impl SyncEntity for Temperature {
    const ENTITY_TYPE: &'static str = "temperature";
}

/// A contraction with the given duration.
pub fn contraction(duration_secs: u32) -> Contraction {
    Contraction {
        started_at: START_MILLIS,
        duration_secs,
        intensity: Intensity::Moderate,
    }
}

/// A doppler heart rate reading.
pub fn heart_rate(bpm: u16) -> FetalHeartRate {
    FetalHeartRate {
        bpm,
        method: "doppler".into(),
    }
}

/// A dilation finding with typical effacement and station.
pub fn dilation(centimetres: u8) -> CervixDilation {
    CervixDilation {
        centimetres,
        effacement_percent: 80,
        station: -1,
    }
}

/// An oral temperature.
pub fn temperature(tenths_celsius: i16) -> Temperature {
    Temperature {
        tenths_celsius,
        site: "oral".into(),
    }
}

/// A sync engine with a fixed device id and a manual clock.
///
/// Dereferences to the wrapped [`SyncEngine`].
pub struct TestEngine<S> {
    /// The engine under test.
    pub engine: SyncEngine<S>,
    /// The clock injected into the engine.
    pub clock: Arc<ManualClock>,
    _temp_dir: Option<TempDir>,
}

impl TestEngine<InMemoryStore> {
    /// Creates an engine over an in-memory store.
    pub fn memory() -> Self {
        Self::memory_with_config(EngineConfig::default())
    }

    /// Creates an engine over an in-memory store with custom configuration.
    pub fn memory_with_config(config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START_MILLIS));
        let engine = build(InMemoryStore::new(), Arc::clone(&clock), LOCAL_DEVICE, config);
        Self {
            engine,
            clock,
            _temp_dir: None,
        }
    }
}

impl TestEngine<FileStore> {
    /// Creates an engine over a durable store in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clock = Arc::new(ManualClock::new(START_MILLIS));
        let store = FileStore::open(temp_dir.path()).expect("Failed to open file store");
        let engine = build(store, Arc::clone(&clock), LOCAL_DEVICE, EngineConfig::default());
        Self {
            engine,
            clock,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Closes the store and opens it again, keeping clock and device id.
    pub fn reopen(self) -> Self {
        let Self {
            engine,
            clock,
            _temp_dir: temp_dir,
        } = self;
        let config = engine.config().clone();
        // The engine holds the directory lock until dropped
        drop(engine);

        let dir = temp_dir.as_ref().expect("File engine should have a directory");
        let store = FileStore::open(dir.path()).expect("Failed to reopen file store");
        let engine = build(store, Arc::clone(&clock), LOCAL_DEVICE, config);
        Self {
            engine,
            clock,
            _temp_dir: temp_dir,
        }
    }

    /// Directory holding the store.
    pub fn path(&self) -> &Path {
        self.engine.store().path()
    }
}

impl<S: RecordStore> TestEngine<S> {
    /// Advances the clock.
    pub fn advance(&self, millis: Millis) {
        self.clock.advance(millis);
    }
}

impl<S> std::ops::Deref for TestEngine<S> {
    type Target = SyncEngine<S>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

fn build<S: RecordStore + 'static>(
    store: S,
    clock: Arc<ManualClock>,
    device: DeviceId,
    config: EngineConfig,
) -> SyncEngine<S> {
    SyncEngine::builder(store)
        .clock(clock)
        .device_identity(FixedDeviceIdentity::new(device))
        .config(config)
        .build()
        .expect("Failed to build sync engine")
}

/// Runs a test with a temporary in-memory engine.
pub fn with_engine<F, R>(f: F) -> R
where
    F: FnOnce(&TestEngine<InMemoryStore>) -> R,
{
    let engine = TestEngine::memory();
    f(&engine)
}

/// Runs a test with a temporary file-backed engine.
pub fn with_file_engine<F, R>(f: F) -> R
where
    F: FnOnce(&TestEngine<FileStore>) -> R,
{
    let engine = TestEngine::file();
    f(&engine)
}
