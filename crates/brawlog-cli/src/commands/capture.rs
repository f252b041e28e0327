//! Live capture command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use brawlog_core::Config;
use chrono::Local;
use tracing::info;

use crate::console::{self, ConsoleObserver, ProgressRenderer};
use crate::shutdown::{self, OnInterrupt};

/// Run the capture command
pub fn run(config: &Config, log: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let source = super::live_source(config, log);
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(config));

    let monitor = super::spawn_monitor(config)?;
    monitor.subscribe(Box::new(ConsoleObserver))?;
    shutdown::install(monitor.interrupt_handle(), OnInterrupt::Stop)?;
    let feed = monitor.status_feed();

    println!("brawlog v{}", env!("CARGO_PKG_VERSION"));
    info!("Capturing from {} into {}", source, output.display());
    println!("Capturing into {} (Ctrl+C to stop)", output.display());
    monitor.start(source, Some(output))?;

    let last = ProgressRenderer::new().quiet_records().follow(&feed)?;
    console::report(&last)
}

/// `<output_dir>/capture-YYYYMMDD-HHMMSS.blog`
fn default_output(config: &Config) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    config
        .capture
        .output_dir
        .join(format!("capture-{}.blog", stamp))
}
