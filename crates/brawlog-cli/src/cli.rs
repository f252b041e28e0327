//! CLI argument definitions for brawlog.

use std::path::PathBuf;

use brawlog_core::ImportSourceType;
use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "brawlog")]
#[command(about = "Combat log capture and store tool", version)]
pub struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "brawlog.toml", env = "BRAWLOG_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Capture the live combat log into a new store
    Capture {
        /// Follow a capture log file instead of the game client
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,
        /// Store file to write (default: timestamped file in the output directory)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Resume capturing into an existing store
    Continue {
        /// Store file to append to
        store: PathBuf,
        /// Follow a capture log file instead of the store's recorded source
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,
    },
    /// Build a store from another parser's export
    Import {
        input: PathBuf,
        output: PathBuf,
        /// Input format (guessed from the extension when omitted)
        #[arg(long, short)]
        format: Option<ImportSourceType>,
        #[command(flatten)]
        upgrade: UpgradeArgs,
    },
    /// Rebuild a store file with the current decoder
    Reparse {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        upgrade: UpgradeArgs,
    },
    /// Probe the live source without writing anything
    Scan {
        /// Probe a capture log file instead of the game client
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print totals for a store file
    Summary {
        store: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct UpgradeArgs {
    /// Reinterpret legacy naive timestamps as local wall-clock time
    #[arg(long)]
    pub upgrade_timestamps: bool,
    /// UTC offset in minutes the legacy timestamps were recorded in
    #[arg(
        long,
        value_name = "MIN",
        requires = "upgrade_timestamps",
        allow_hyphen_values = true
    )]
    pub utc_offset: Option<i32>,
}
