//! Reparse command.

use std::path::Path;

use anyhow::Result;
use brawlog_core::{Config, ImportSourceType};

use crate::cli::UpgradeArgs;

/// Run the reparse command
pub fn run(config: &Config, input: &Path, output: &Path, upgrade: &UpgradeArgs) -> Result<()> {
    let upgrade = super::upgrade_offset(upgrade)?;

    println!("Reparsing {} into {}", input.display(), output.display());
    let monitor = super::spawn_monitor(config)?;
    super::import::rebuild(&monitor, |monitor| match upgrade {
        Some(offset) => {
            monitor.upgrade_timestamp_import(input, output, ImportSourceType::Native, offset)
        }
        None => monitor.reparse(input, output),
    })
}
