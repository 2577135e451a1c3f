//! CLI parse: clap types for Almanac. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Almanac CLI - maintenance surface for the sync core
#[derive(Parser)]
#[command(name = "almanac")]
#[command(about = "Deletion-safe synchronization for a personal records database")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database directory (overrides configured storage path)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and maintain association tombstones
    Tombstone {
        #[command(subcommand)]
        command: TombstoneCommands,
    },
    /// Inspect and maintain sync state and conflicts
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand)]
pub enum TombstoneCommands {
    /// List tombstones, newest first
    List {
        /// Filter by association table name
        #[arg(long)]
        table: Option<String>,
        /// Maximum rows to show
        #[arg(long)]
        limit: Option<usize>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show aggregate tombstone counts
    Stats {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Purge expired tombstones
    Cleanup {
        /// Report counts without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete one tombstone, re-allowing that association
    Remove {
        /// Association table name
        table: String,
        /// Left (parent) entity id
        left_id: i64,
        /// Right (related) entity id
        right_id: i64,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show all sync-state rows
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show aggregate sync-state counts
    Stats {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List entities with unresolved conflicts
    Conflicts {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Clear the conflict flag for one entity
    Resolve {
        /// Entity type (e.g. entry, person)
        entity_type: String,
        /// Entity id
        entity_id: i64,
    },
}
