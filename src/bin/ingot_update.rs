//! ingot-update: Update existing SQLite rows from the records of a JSON document
//!
//! Each record locates one row through the configured key column and sets
//! the update columns it carries a value for.
//!
//! Usage:
//!   ingot-update --config update.json
//!   ingot-update --config update.json --dry-run -v

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use ingot::logging::{init_logging, LogConfig};
use ingot::{progress_channel, spawn_update, UpdateConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ingot-update")]
#[command(about = "Update SQLite rows located by a key column from JSON records", long_about = None)]
struct Args {
    /// Update configuration (JSON)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: PathBuf,

    /// Check every row without writing
    #[arg(long)]
    dry_run: bool,

    /// Maximum number of records to apply
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

    let mut config = UpdateConfig::from_path(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    config.dry_run |= args.dry_run;
    if args.limit.is_some() {
        config.limit = args.limit;
    }
    if args.offset.is_some() {
        config.offset = args.offset;
    }

    let (tx, rx) = progress_channel();
    let handle = spawn_update(config, tx);
    for progress in rx {
        eprintln!(
            "[{:?}] {}/{} processed, {} updated, {} failed: {}",
            progress.status,
            progress.processed,
            progress.total,
            progress.succeeded,
            progress.failed,
            progress.message
        );
    }

    let summary = handle.join().context("Update failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
