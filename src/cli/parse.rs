//! CLI parse: clap types for graphcache. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// graphcache CLI - inspect the persisted mutation queue and record cache
#[derive(Parser, Debug)]
#[command(name = "graphcache")]
#[command(about = "Inspect the offline mutation queue and normalized cache")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides layered config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Offline mutation queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Normalized record cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// List queued mutations in replay order
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Remove a queued mutation by request id or by position
    Remove {
        /// Request id of the entry to remove
        #[arg(required_unless_present = "position", conflicts_with = "position")]
        request_id: Option<String>,
        /// Zero-based queue position instead of a request id
        #[arg(long)]
        position: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Denormalize one stored record through a selection
    Read {
        /// Record id, e.g. `User:1` or `ROOT_QUERY`
        reference: String,
        /// JSON file with `selection_set`, and optionally `fragments` and `variables`
        #[arg(long)]
        selection: PathBuf,
        /// Omit missing fields instead of failing
        #[arg(long)]
        partial: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
}
