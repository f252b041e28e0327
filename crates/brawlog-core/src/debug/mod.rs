//! Diagnostics for live capture sources
//!
//! This module provides tools for:
//! - Probing a live source without touching any store (`ScanReport`)

mod scan;

pub use scan::ScanReport;
