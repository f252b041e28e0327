//! Resume a capture into an existing store.

use std::path::Path;

use anyhow::Result;
use brawlog_core::{Config, SourceDescriptor};

use crate::console::{self, ConsoleObserver, ProgressRenderer};
use crate::shutdown::{self, OnInterrupt};

/// Run the continue command
pub fn run(config: &Config, store: &Path, log: Option<&Path>) -> Result<()> {
    let monitor = super::spawn_monitor(config)?;
    monitor.open_database(store)?;
    let count = monitor.with_store(|store| store.len())?;
    println!("Opened {} ({} records)", store.display(), count);

    let source = log.map(|path| SourceDescriptor::LogFile {
        path: path.to_path_buf(),
    });
    monitor.subscribe(Box::new(ConsoleObserver))?;
    shutdown::install(monitor.interrupt_handle(), OnInterrupt::Stop)?;
    let feed = monitor.status_feed();
    monitor.continue_capture(source)?;
    println!("Continuing capture (Ctrl+C to stop)");

    let last = ProgressRenderer::new().quiet_records().follow(&feed)?;
    console::report(&last)
}
