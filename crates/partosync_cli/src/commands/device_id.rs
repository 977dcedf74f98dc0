//! Device-id command implementation.

use super::open_engine;
use std::path::Path;

/// Runs the device-id command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path)?;
    println!("{}", engine.device_id()?);
    engine.flush()?;
    Ok(())
}
