//! ingot-import: Insert the records of a JSON document into a SQLite table
//!
//! Usage:
//!   # Run an import described by a config file
//!   ingot-import --config import.json
//!
//!   # Validate and resolve every row without writing
//!   ingot-import --config import.json --dry-run
//!
//!   # Only records 100..150
//!   ingot-import --config import.json --offset 100 --limit 50
//!
//! Progress lines go to stderr; the final summary is printed to stdout as JSON.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use ingot::logging::{init_logging, LogConfig};
use ingot::{progress_channel, spawn_import, ImportConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ingot-import")]
#[command(about = "Import JSON records into an existing SQLite table", long_about = None)]
struct Args {
    /// Import configuration (JSON)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: PathBuf,

    /// Validate and resolve every row without writing
    #[arg(long)]
    dry_run: bool,

    /// Maximum number of records to import
    #[arg(long)]
    limit: Option<usize>,

    /// Number of records to skip
    #[arg(long)]
    offset: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&LogConfig::from_verbosity(args.verbose));

    let mut config = ImportConfig::from_path(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    config.dry_run |= args.dry_run;
    if args.limit.is_some() {
        config.limit = args.limit;
    }
    if args.offset.is_some() {
        config.offset = args.offset;
    }

    let (tx, rx) = progress_channel();
    let handle = spawn_import(config, tx);
    for progress in rx {
        eprintln!(
            "[{:?}] {}/{} processed, {} succeeded, {} failed: {}",
            progress.status,
            progress.processed,
            progress.total,
            progress.succeeded,
            progress.failed,
            progress.message
        );
    }

    let summary = handle.join().context("Import failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
