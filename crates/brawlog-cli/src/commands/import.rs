//! Import command.

use std::path::Path;

use anyhow::{Result, anyhow, bail};
use brawlog_core::{Config, ImportSourceType, Monitor};

use crate::cli::UpgradeArgs;
use crate::console::{self, ProgressRenderer};
use crate::shutdown::{self, OnInterrupt};

/// Run the import command
pub fn run(
    config: &Config,
    input: &Path,
    output: &Path,
    format: Option<ImportSourceType>,
    upgrade: &UpgradeArgs,
) -> Result<()> {
    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }
    let format = match format {
        Some(format) => format,
        None => ImportSourceType::from_path(input).ok_or_else(|| {
            anyhow!(
                "Cannot tell the format of {}; pass --format",
                input.display()
            )
        })?,
    };
    let upgrade = super::upgrade_offset(upgrade)?;

    println!("Importing {} ({}) into {}", input.display(), format, output.display());
    let monitor = super::spawn_monitor(config)?;
    rebuild(&monitor, |monitor| match upgrade {
        Some(offset) => monitor.upgrade_timestamp_import(input, output, format, offset),
        None => monitor.import(input, output, format),
    })
}

/// Launch a rebuild with `launch` and follow it to the end.
pub fn rebuild<F>(monitor: &Monitor, launch: F) -> Result<()>
where
    F: FnOnce(&Monitor) -> brawlog_core::Result<()>,
{
    shutdown::install(monitor.interrupt_handle(), OnInterrupt::Cancel)?;
    let feed = monitor.status_feed();
    launch(monitor)?;
    let last = ProgressRenderer::new().follow(&feed)?;
    console::report(&last)
}
