//! Ctrl+C handling.

use anyhow::Result;
use brawlog_core::MonitorInterrupt;

/// What Ctrl+C does to the running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnInterrupt {
    /// End a capture, keeping what was captured.
    Stop,
    /// Abandon a rebuild and roll back.
    Cancel,
}

/// Route Ctrl+C to the monitor.
pub fn install(interrupt: MonitorInterrupt, action: OnInterrupt) -> Result<()> {
    ctrlc::set_handler(move || match action {
        OnInterrupt::Stop => {
            eprintln!("\nStopping...");
            interrupt.stop();
        }
        OnInterrupt::Cancel => {
            eprintln!("\nCancelling...");
            interrupt.cancel();
        }
    })?;
    Ok(())
}
