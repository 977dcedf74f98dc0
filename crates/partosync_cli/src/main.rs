//! partosync CLI
//!
//! Command-line tools for inspecting a durable partosync record store.
//!
//! # Commands
//!
//! - `device-id` - Print the store's device id, creating it if needed
//! - `pending` - List records awaiting push, oldest first
//! - `conflicts` - List records holding an unresolved remote state
//! - `inspect` - Display per-entity-type sync counts
//! - `compact` - Rewrite the record log

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// partosync command-line store tools.
#[derive(Parser)]
#[command(name = "partosync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the device id recorded in the store
    DeviceId,

    /// List records awaiting push, oldest first
    Pending {
        /// Only list records of this entity type
        #[arg(short, long)]
        entity_type: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// List conflicted records
    Conflicts {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Display per-entity-type sync counts
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Rewrite the record log, keeping only the latest state per record
    Compact,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::DeviceId => {
            let path = cli.path.ok_or("Store path required for device-id")?;
            commands::device_id::run(&path)?;
        }
        Commands::Pending {
            entity_type,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for pending")?;
            commands::pending::run(&path, entity_type.as_deref(), format)?;
        }
        Commands::Conflicts { format } => {
            let path = cli.path.ok_or("Store path required for conflicts")?;
            commands::conflicts::run(&path, format)?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, format)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path)?;
        }
        Commands::Version => {
            println!("partosync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("partosync core v{}", partosync_core::VERSION);
        }
    }

    Ok(())
}
