//! CLI command implementations.
//!
//! This module contains the implementation of each CLI command.

pub mod capture;
pub mod continue_capture;
pub mod import;
pub mod reparse;
pub mod scan;
pub mod summary;

use std::path::Path;

use anyhow::Result;
use brawlog_core::{Config, Monitor, MonitorOptions, SourceDescriptor};
use chrono::FixedOffset;

use crate::cli::UpgradeArgs;

/// The live source to read: a capture log if given, otherwise the game client.
pub fn live_source(config: &Config, log: Option<&Path>) -> SourceDescriptor {
    match log {
        Some(path) => SourceDescriptor::LogFile {
            path: path.to_path_buf(),
        },
        None => SourceDescriptor::Memory {
            process_name: config.capture.process_name.clone(),
            layout: config.capture.chat_log.clone(),
        },
    }
}

pub fn spawn_monitor(config: &Config) -> Result<Monitor> {
    Ok(Monitor::new(MonitorOptions::from(config))?)
}

/// `None` when no upgrade was requested, `Some(None)` to use the default offset.
pub fn upgrade_offset(args: &UpgradeArgs) -> Result<Option<Option<FixedOffset>>> {
    if !args.upgrade_timestamps {
        return Ok(None);
    }
    match args.utc_offset {
        Some(minutes) => {
            let offset = FixedOffset::east_opt(minutes * 60)
                .ok_or_else(|| anyhow::anyhow!("UTC offset out of range: {} minutes", minutes))?;
            Ok(Some(Some(offset)))
        }
        None => Ok(Some(None)),
    }
}
