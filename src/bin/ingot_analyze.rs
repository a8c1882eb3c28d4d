//! ingot-analyze: Inspect a JSON document or a target SQLite database
//!
//! Usage:
//!   # Every path of a document with its type and a sample
//!   ingot-analyze paths data.json
//!
//!   # Stream paths as JSON lines while the walk runs
//!   ingot-analyze paths --progressive data.json
//!
//!   # First 5 records under a root path
//!   ingot-analyze sample data.json --root 'data.users[]' --limit 5
//!
//!   # Tables of a database, then one table's columns and UNIQUE indexes
//!   ingot-analyze tables app.db
//!   ingot-analyze table app.db users

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ingot::logging::{init_logging, LogConfig};
use ingot::AnalysisEvent;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ingot-analyze")]
#[command(about = "Inspect JSON documents and SQLite tables before an import", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Compact output (no pretty-printing)
    #[arg(long, global = true)]
    compact: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every path of a JSON document
    Paths {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Print each path as a JSON line as soon as it is found
        #[arg(long)]
        progressive: bool,
    },

    /// Print the records found under a root path
    Sample {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Root path, e.g. `data.users[]` (empty for the document root)
        #[arg(long, default_value = "")]
        root: String,

        /// Maximum number of records
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List the user tables of a database
    Tables {
        #[arg(value_name = "DB")]
        db: PathBuf,
    },

    /// Describe the columns and UNIQUE indexes of a table
    Table {
        #[arg(value_name = "DB")]
        db: PathBuf,

        #[arg(value_name = "TABLE")]
        table: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&LogConfig::from_verbosity(args.verbose));

    match args.command {
        Command::Paths { input, progressive: true } => stream_paths(input),
        Command::Paths { input, progressive: false } => {
            let paths = ingot::analyze_structure(&input)
                .with_context(|| format!("Failed to analyze {}", input.display()))?;
            print_json(&paths, args.compact)
        }
        Command::Sample { input, root, limit } => {
            let records = ingot::get_sample(&input, &root, limit)
                .with_context(|| format!("Failed to extract '{}' from {}", root, input.display()))?;
            print_json(&records, args.compact)
        }
        Command::Tables { db } => {
            let tables = ingot::get_tables(&db)
                .with_context(|| format!("Failed to list tables of {}", db.display()))?;
            print_json(&tables, args.compact)
        }
        Command::Table { db, table } => {
            let info = ingot::analyze_table(&db, &table)
                .with_context(|| format!("Failed to analyze table '{}'", table))?;
            print_json(&info, args.compact)
        }
    }
}

fn stream_paths(input: PathBuf) -> Result<()> {
    let (tx, rx) = crossbeam_channel::bounded(256);
    let worker = ingot::spawn_structure_analysis(input, tx);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut failure = None;
    for event in rx {
        writeln!(out, "{}", serde_json::to_string(&event)?)?;
        if let AnalysisEvent::Failed { message } = event {
            failure = Some(message);
        }
    }

    worker
        .join()
        .map_err(|_| anyhow::anyhow!("analysis thread panicked"))?;
    match failure {
        Some(message) => anyhow::bail!("Analysis failed: {}", message),
        None => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let output = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", output);
    Ok(())
}
