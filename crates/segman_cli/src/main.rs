//! Segman CLI
//!
//! Command-line tools for sizing segment manager budgets.
//!
//! # Commands
//!
//! - `budget` - Display the file descriptor limit and open-index budget
//! - `usage` - Display segment directory sizes and simulated evictions

mod commands;

use clap::{Parser, Subcommand};
use segman_core::DEFAULT_PERSISTENT_INDEX_FILE_HANDLES;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Segment manager resource tools.
#[derive(Parser)]
#[command(name = "segman")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the persist directory
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
    /// Display the file descriptor limit and open-index budget
    Budget {
        /// Descriptor limit to use instead of the OS limit
        #[arg(short, long)]
        max_file_handles: Option<u64>,

        /// File handles one persistent index holds
        #[arg(long, default_value_t = DEFAULT_PERSISTENT_INDEX_FILE_HANDLES)]
        handles_per_index: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display segment directory sizes under the persist directory
    Usage {
        /// Memory budget in bytes to simulate eviction against
        #[arg(short, long)]
        memory_limit: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Budget {
            max_file_handles,
            handles_per_index,
            format,
        } => {
            commands::budget::run(max_file_handles, handles_per_index, &format)?;
        }
        Commands::Usage {
            memory_limit,
            format,
        } => {
            let path = cli.path.ok_or("Persist directory required for usage")?;
            commands::usage::run(&path, memory_limit, &format)?;
        }
        Commands::Version => {
            println!("Segman CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Segman Core v{}", segman_core::VERSION);
        }
    }

    Ok(())
}
