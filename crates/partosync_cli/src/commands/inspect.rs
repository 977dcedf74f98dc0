//! Inspect command implementation.

use super::{open_read_only, stored_device_id, Format};
use partosync_core::{DeviceId, EntityStats, SyncStats};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Device id recorded in the store, or `(none)` before first use.
    pub device_id: String,
    /// Record log size in bytes.
    pub log_size: u64,
    /// Counts per entity type.
    pub entity_types: SyncStats,
    /// Counts across all entity types.
    pub totals: EntityStats,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_read_only(path)?;
    let stats = engine.stats()?;
    let result = InspectResult {
        path: path.display().to_string(),
        device_id: device_id_label(stored_device_id(&**engine.store())?),
        log_size: engine.store().log_size()?,
        totals: stats.totals(),
        entity_types: stats,
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn device_id_label(id: Option<DeviceId>) -> String {
    id.map_or_else(|| "(none)".to_string(), |id| id.to_string())
}

fn print_text_output(result: &InspectResult) {
    println!("partosync Store Inspection");
    println!("==========================");
    println!();
    println!("Path:      {}", result.path);
    println!("Device id: {}", result.device_id);
    println!("Log size:  {}", format_size(result.log_size));
    println!();

    if result.entity_types.is_empty() {
        println!("No records.");
        return;
    }

    println!(
        "{:<20}  {:>6}  {:>6}  {:>6}  {:>6}  {:>6}  {:>10}",
        "TYPE", "TOTAL", "ACTIVE", "DEL", "CLEAN", "DIRTY", "CONFLICTED"
    );
    for (entity_type, counts) in result.entity_types.iter() {
        print_counts(entity_type, counts);
    }
    print_counts("(all)", &result.totals);
    println!();
    println!("Pending push: {}", result.totals.pending());
}

fn print_counts(label: &str, counts: &EntityStats) {
    println!(
        "{:<20}  {:>6}  {:>6}  {:>6}  {:>6}  {:>6}  {:>10}",
        label,
        counts.total,
        counts.active,
        counts.tombstoned,
        counts.clean,
        counts.dirty,
        counts.conflicted
    );
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
