//! Conflicts command implementation.

use super::{open_read_only, print_rows, Format, RecordRow};
use std::path::Path;

/// Runs the conflicts command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_read_only(path)?;
    let rows: Vec<_> = engine
        .conflicts()?
        .iter()
        .map(RecordRow::from_record)
        .collect();

    if format == Format::Text {
        for row in &rows {
            if let Some(remote) = row.remote_server_version {
                println!(
                    "{}: local sv {} vs remote sv {}",
                    row.id, row.server_version, remote
                );
            }
        }
        if !rows.is_empty() {
            println!();
        }
    }
    print_rows(&rows, format)
}
