//! Compact command implementation.

use partosync_storage::{FileStore, StoreConfig};
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::open_with_config(path, StoreConfig::new().create_if_missing(false))?;
    let before = store.log_size()?;

    println!("Compacting record log at {:?}", store.log_path());
    let reclaimed = store.compact()?;

    println!("  Size before: {} bytes", before);
    println!("  Size after:  {} bytes", before.saturating_sub(reclaimed));
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        reclaimed,
        if before > 0 {
            reclaimed as f64 / before as f64 * 100.0
        } else {
            0.0
        }
    );
    Ok(())
}
