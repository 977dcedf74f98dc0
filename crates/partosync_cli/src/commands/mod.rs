//! CLI command implementations.

pub mod compact;
pub mod conflicts;
pub mod device_id;
pub mod inspect;
pub mod pending;

use clap::ValueEnum;
use partosync_core::{DeviceId, FixedDeviceIdentity, StoredRecord, SyncEngine, DEVICE_ID_META};
use partosync_storage::{FileStore, RecordStore, StoreConfig};
use serde::Serialize;
use std::path::Path;

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable table.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Opens or creates the store at `path` and builds an engine over it.
///
/// The engine loads the stored device id, generating one on first use.
pub fn open_engine(path: &Path) -> Result<SyncEngine<FileStore>, Box<dyn std::error::Error>> {
    let store = FileStore::open_with_config(path, StoreConfig::new())?;
    Ok(SyncEngine::builder(store).build()?)
}

/// Opens an existing store for inspection and builds an engine over it.
///
/// A mistyped path fails instead of leaving an empty store behind, and no
/// device id is generated: the engine reports the stored one, or the nil
/// id if the store has none.
pub fn open_read_only(path: &Path) -> Result<SyncEngine<FileStore>, Box<dyn std::error::Error>> {
    let store = FileStore::open_with_config(path, StoreConfig::new().create_if_missing(false))?;
    let device_id = stored_device_id(&store)?.unwrap_or(DeviceId::from_bytes([0; 16]));
    Ok(SyncEngine::builder(store)
        .device_identity(FixedDeviceIdentity::new(device_id))
        .build()?)
}

/// Returns the device id recorded in `store`, if any.
pub fn stored_device_id<S: RecordStore>(
    store: &S,
) -> Result<Option<DeviceId>, Box<dyn std::error::Error>> {
    let Some(bytes) = store.get_meta(DEVICE_ID_META)? else {
        return Ok(None);
    };
    match DeviceId::from_slice(&bytes) {
        Some(id) => Ok(Some(id)),
        None => Err(format!("stored device id has {} bytes, expected 16", bytes.len()).into()),
    }
}

/// Envelope summary of one row, as listed by `pending` and `conflicts`.
#[derive(Debug, Serialize)]
pub struct RecordRow {
    /// Record id.
    pub id: String,
    /// Entity type name.
    pub entity_type: String,
    /// Sync status.
    pub status: &'static str,
    /// Local version counter.
    pub local_version: u64,
    /// Last acknowledged server version.
    pub server_version: u64,
    /// Last update time in epoch milliseconds.
    pub updated_at: u64,
    /// Whether the row is a tombstone.
    pub deleted: bool,
    /// Device of the last mutation.
    pub device_id: String,
    /// Content hash in hex.
    pub content_hash: String,
    /// Server version of the held remote state, for conflicted rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_server_version: Option<u64>,
}

impl RecordRow {
    /// Summarizes a stored row.
    pub fn from_record(row: &StoredRecord) -> Self {
        let envelope = &row.envelope;
        let remote_server_version = row
            .conflict_snapshot()
            .ok()
            .flatten()
            .map(|remote| remote.envelope.server_version);
        Self {
            id: envelope.id.to_string(),
            entity_type: row.entity_type.clone(),
            status: envelope.sync_status.as_str(),
            local_version: envelope.local_version,
            server_version: envelope.server_version,
            updated_at: envelope.updated_at,
            deleted: envelope.is_tombstone(),
            device_id: envelope.device_id.to_string(),
            content_hash: envelope.content_hash.to_hex(),
            remote_server_version,
        }
    }
}

/// Prints rows in the requested format.
pub fn print_rows(rows: &[RecordRow], format: Format) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(rows)?);
        }
        Format::Text => {
            if rows.is_empty() {
                println!("(none)");
                return Ok(());
            }
            println!(
                "{:<36}  {:<20}  {:<10}  {:>5}  {:>5}  {:>13}",
                "ID", "TYPE", "STATUS", "LV", "SV", "UPDATED_AT"
            );
            for row in rows {
                let status = if row.deleted {
                    format!("{}*", row.status)
                } else {
                    row.status.to_string()
                };
                println!(
                    "{:<36}  {:<20}  {:<10}  {:>5}  {:>5}  {:>13}",
                    row.id,
                    row.entity_type,
                    status,
                    row.local_version,
                    row.server_version,
                    row.updated_at
                );
            }
            println!();
            println!("{} record(s); * marks tombstones", rows.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::Value;
    use partosync_core::{ContentHash, RecordId, SyncEnvelope, SyncStatus};
    use partosync_storage::{StorageError, Write};
    use tempfile::tempdir;

    fn row(status: SyncStatus) -> StoredRecord {
        let device = DeviceId::from_bytes([3; 16]);
        StoredRecord {
            entity_type: "temperature".into(),
            envelope: SyncEnvelope {
                id: RecordId::from_bytes([9; 16]),
                created_at: 10,
                updated_at: 20,
                deleted_at: Some(20),
                device_id: device,
                origin_device_id: device,
                local_version: 2,
                server_version: 1,
                sync_status: status,
                content_hash: ContentHash::from_bytes([0xab; 32]),
                conflict_payload: None,
            },
            payload: Value::Null,
        }
    }

    #[test]
    fn summarizes_envelope() {
        let summary = RecordRow::from_record(&row(SyncStatus::Dirty));
        assert_eq!(summary.status, "dirty");
        assert_eq!(summary.local_version, 2);
        assert!(summary.deleted);
        assert_eq!(summary.content_hash, "ab".repeat(32));
        assert_eq!(summary.remote_server_version, None);
    }

    #[test]
    fn json_omits_missing_remote_version() {
        let summary = RecordRow::from_record(&row(SyncStatus::Dirty));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["entity_type"], "temperature");
        assert!(json.get("remote_server_version").is_none());
    }

    #[test]
    fn read_only_open_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store
                .transact(&[1u8; 16], |_| {
                    Ok::<_, StorageError>((Write::Put(b"row".to_vec()), ()))
                })
                .unwrap();
        }
        let log_len = FileStore::open(dir.path()).unwrap().log_size().unwrap();

        let engine = open_read_only(dir.path()).unwrap();
        assert_eq!(engine.device_id().unwrap(), DeviceId::from_bytes([0; 16]));
        assert_eq!(stored_device_id(&**engine.store()).unwrap(), None);
        assert_eq!(engine.store().log_size().unwrap(), log_len);
    }

    #[test]
    fn read_only_open_reports_stored_device_id() {
        let dir = tempdir().unwrap();
        let created = open_engine(dir.path()).unwrap().device_id().unwrap();

        let engine = open_read_only(dir.path()).unwrap();
        assert_eq!(engine.device_id().unwrap(), created);
        assert_eq!(stored_device_id(&**engine.store()).unwrap(), Some(created));
    }

    #[test]
    fn read_only_open_requires_existing_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent");
        assert!(open_read_only(&path).is_err());
        assert!(!path.exists());
    }
}
