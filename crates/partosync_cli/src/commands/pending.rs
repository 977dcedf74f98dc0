//! Pending command implementation.

use super::{open_read_only, print_rows, Format, RecordRow};
use std::path::Path;

/// Runs the pending command.
pub fn run(
    path: &Path,
    entity_type: Option<&str>,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_read_only(path)?;
    let pending = engine.list_pending(entity_type);

    let mut rows = Vec::new();
    for row in &pending {
        rows.push(RecordRow::from_record(&row?));
    }
    print_rows(&rows, format)
}
