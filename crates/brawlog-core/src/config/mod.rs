//! Configuration and tuning constants.
//!
//! This module contains:
//! - `Config` - user configuration loaded from a TOML file
//! - Polling, retry, and frame format constants

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::source::ChatLogLayout;

/// Live capture polling configuration.
pub mod polling {
    /// Default delay (in ms) between polls of a live source.
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

    /// Upper bound on bytes pulled from a log file in a single poll.
    pub const MAX_POLL_BYTES: usize = 64 * 1024;
}

/// Memory read retry configuration.
///
/// Exponential backoff: 50ms → 100ms → 200ms = total ~350ms max before the
/// process is considered gone.
pub mod retry {
    /// Maximum number of attempts for a chat ring read.
    pub const MAX_READ_RETRIES: u32 = 3;

    /// Delay (in ms) after each failed attempt.
    pub const RETRY_DELAYS_MS: [u64; 3] = [50, 100, 200];
}

/// Live frame wire format constants.
pub mod frame {
    /// Frame start marker ("KB" little-endian).
    pub const MAGIC: u16 = 0x4B42;

    /// magic (2) + length (2) + timestamp (8)
    pub const HEADER_LEN: usize = 12;

    /// Trailing xor checksum byte.
    pub const CHECKSUM_LEN: usize = 1;

    /// Largest payload a frame may declare.
    pub const MAX_PAYLOAD_LEN: usize = 4096;
}

/// User configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub poll_interval_ms: u64,
    pub process_name: String,
    pub output_dir: PathBuf,
    pub chat_log: ChatLogLayout,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: polling::DEFAULT_POLL_INTERVAL_MS,
            process_name: "pol.exe".to_string(),
            output_dir: PathBuf::from("captures"),
            chat_log: ChatLogLayout::default(),
        }
    }
}

impl CaptureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Offset applied to legacy naive timestamps during a timestamp upgrade.
    pub upgrade_utc_offset_minutes: Option<i32>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.capture.poll_interval_ms, 100);
        assert_eq!(config.capture.process_name, "pol.exe");
        assert!(config.import.upgrade_utc_offset_minutes.is_none());
    }

    #[test]
    fn test_parse_partial() {
        let config = Config::parse(
            r#"
            [capture]
            poll_interval_ms = 25

            [capture.chat_log]
            address = 4096
            slot_count = 8
            slot_size = 256

            [import]
            upgrade_utc_offset_minutes = 540
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.poll_interval(), Duration::from_millis(25));
        assert_eq!(config.capture.process_name, "pol.exe");
        assert_eq!(config.capture.chat_log.address, 4096);
        assert_eq!(config.capture.chat_log.slot_count, 8);
        assert_eq!(config.import.upgrade_utc_offset_minutes, Some(540));
    }

    #[test]
    fn test_parse_error() {
        let result = Config::parse("[capture]\npoll_interval_ms = \"fast\"");
        assert!(matches!(result, Err(Error::ConfigParseError(_))));
    }

    #[test]
    fn test_frame_constants() {
        assert_eq!(frame::HEADER_LEN, 12);
        assert_eq!(retry::RETRY_DELAYS_MS.len() as u32, retry::MAX_READ_RETRIES);
    }
}
