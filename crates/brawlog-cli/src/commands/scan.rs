//! Scan command implementation.

use std::path::Path;

use anyhow::Result;
use brawlog_core::{Config, ScanReport};

/// Run the scan command
pub fn run(config: &Config, log: Option<&Path>, json: bool) -> Result<()> {
    let source = super::live_source(config, log);
    let report = ScanReport::probe(&source)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Source: {}", report.source);
    if let Some(counter) = report.ring_counter {
        println!("Lines written: {}", counter);
    }
    println!("Bytes available: {}", report.bytes_available);
    println!(
        "Frames: {} decoded, {} corrupt, {} undecodable",
        report.frames_decoded, report.corrupt_frames, report.undecodable_lines
    );
    if let (Some(first), Some(last)) = (report.first_timestamp, report.last_timestamp) {
        println!("Time span: {} .. {}", first, last);
    }

    if !report.kind_counts.is_empty() {
        println!();
        println!("By kind:");
        for (kind, count) in &report.kind_counts {
            let name: &'static str = (*kind).into();
            println!("  {:<14} {}", name, count);
        }
    }
    if !report.code_counts.is_empty() {
        println!("By message code:");
        for (code, count) in &report.code_counts {
            println!("  0x{:<12} {}", code, count);
        }
    }
    Ok(())
}
