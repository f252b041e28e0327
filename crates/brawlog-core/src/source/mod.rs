//! Source readers.
//!
//! A reader turns one kind of input into an ordered stream of event records:
//!
//! - [`LiveReader`]: frames from the running client or a growing capture log
//! - [`ReplayReader`]: a store file written earlier
//! - [`ImportReader`]: an export from another parser
//!
//! [`open_reader`] picks the right one for a [`SourceDescriptor`].

pub mod frame;
mod import;
mod live;
mod progress;
mod replay;

pub use frame::{FrameDecoder, FrameEvent, encode_frame};
pub use import::{DirectParseFormat, DvsParseFormat, ENTRY_CHAT_LINE, ForeignEntry, ForeignFormat, ImportReader};
pub use live::{FrameSource, LiveReader, LogTailSource, MemoryFrameSource, SourcePoll};
pub use progress::{CancelToken, ProgressState, ProgressStatus};
pub use replay::ReplayReader;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::info;

use crate::config::polling::DEFAULT_POLL_INTERVAL_MS;
use crate::error::Result;
use crate::process::{MemoryReader, ProcessHandle};
use crate::record::EventRecord;
use crate::retry::{FixedDelay, RetryStrategy};

const ATTACH_ATTEMPTS: u32 = 3;
const ATTACH_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Foreign file formats accepted by imports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "kebab-case")]
pub enum ImportSourceType {
    /// A store file written by this tool.
    Native,
    DirectParse,
    DvsParse,
}

impl ImportSourceType {
    pub fn extension(&self) -> &'static str {
        match self {
            ImportSourceType::Native => "blog",
            ImportSourceType::DirectParse => "dpd",
            ImportSourceType::DvsParse => "dvsd",
        }
    }

    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        <Self as strum::IntoEnumIterator>::iter().find(|t| t.extension() == ext)
    }
}

/// Location of the game client's chat ring in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatLogLayout {
    /// Absolute address of the line counter.
    pub address: u64,
    pub slot_count: u32,
    /// Bytes per slot, including the u16 length prefix.
    pub slot_size: u32,
}

impl Default for ChatLogLayout {
    fn default() -> Self {
        Self {
            address: 0,
            slot_count: 512,
            slot_size: 512,
        }
    }
}

impl ChatLogLayout {
    const SLOTS_OFFSET: u64 = 8;

    pub fn slot_address(&self, line: u64) -> u64 {
        let slot = line % self.slot_count.max(1) as u64;
        self.address + Self::SLOTS_OFFSET + slot * self.slot_size as u64
    }

    /// Bytes spanned by the counter and all slots.
    pub fn byte_len(&self) -> usize {
        Self::SLOTS_OFFSET as usize + self.slot_count as usize * self.slot_size as usize
    }
}

/// What to read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    /// The running game client.
    Memory {
        process_name: String,
        layout: ChatLogLayout,
    },
    /// A capture log that may still be growing.
    LogFile { path: PathBuf },
    /// A store file to replay.
    Store { path: PathBuf },
    /// An export from another parser.
    Foreign {
        path: PathBuf,
        format: ImportSourceType,
    },
}

impl SourceDescriptor {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDescriptor::Memory { .. } | SourceDescriptor::LogFile { .. } => SourceKind::Live,
            SourceDescriptor::Store { .. } => SourceKind::Replay,
            SourceDescriptor::Foreign {
                format: ImportSourceType::Native,
                ..
            } => SourceKind::Replay,
            SourceDescriptor::Foreign { .. } => SourceKind::Import,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            SourceDescriptor::Memory { .. } => None,
            SourceDescriptor::LogFile { path }
            | SourceDescriptor::Store { path }
            | SourceDescriptor::Foreign { path, .. } => Some(path),
        }
    }
}

impl std::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceDescriptor::Memory { process_name, .. } => write!(f, "process {}", process_name),
            SourceDescriptor::LogFile { path } => write!(f, "log {}", path.display()),
            SourceDescriptor::Store { path } => write!(f, "store {}", path.display()),
            SourceDescriptor::Foreign { path, format } => {
                write!(f, "{} {}", format, path.display())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SourceKind {
    Live,
    Replay,
    Import,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Record(EventRecord),
    /// A live source had nothing new this poll.
    Idle,
    EndOfStream,
}

/// A producer of event records.
///
/// Sequence numbers from one reader start at 1 (or after the resume point)
/// and increase by one per record. Progress becomes terminal exactly once,
/// `Completed` at end of stream or `Failed` on a fatal error.
pub trait SourceReader: Send {
    fn kind(&self) -> SourceKind;

    /// Produce the next outcome. A live reader blocks for at most one poll
    /// interval before returning `Idle`.
    fn next(&mut self) -> Result<ReadOutcome>;

    fn progress(&self) -> ProgressStatus;

    /// Request cancellation; the next call to `next` fails with `Cancelled`.
    fn cancel(&self);
}

#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub cancel: CancelToken,
    pub poll_interval: Duration,
    /// Last sequence already captured, for resuming a live capture.
    pub resume_after: u64,
    /// Offset that naive timestamps were recorded in.
    pub timestamp_upgrade: Option<FixedOffset>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            cancel: CancelToken::new(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            resume_after: 0,
            timestamp_upgrade: None,
        }
    }
}

/// Find the game client, retrying briefly while it starts up.
pub(crate) fn attach(process_name: &str) -> Result<ProcessHandle> {
    let process = FixedDelay::new(ATTACH_ATTEMPTS, ATTACH_RETRY_DELAY)
        .execute(|_| ProcessHandle::find_and_open(process_name))?;
    info!("Attached to {} (PID {})", process_name, process.pid);
    Ok(process)
}

/// Open the reader for `descriptor`.
pub fn open_reader(
    descriptor: &SourceDescriptor,
    options: &ReaderOptions,
) -> Result<Box<dyn SourceReader>> {
    info!("Opening {}", descriptor);
    let reader: Box<dyn SourceReader> = match descriptor {
        SourceDescriptor::Memory {
            process_name,
            layout,
        } => {
            let process = attach(process_name)?;
            let source = MemoryFrameSource::new(MemoryReader::new(process), layout.clone());
            Box::new(LiveReader::new(Box::new(source), options))
        }
        SourceDescriptor::LogFile { path } => {
            Box::new(LiveReader::new(Box::new(LogTailSource::open(path)?), options))
        }
        SourceDescriptor::Store { path }
        | SourceDescriptor::Foreign {
            path,
            format: ImportSourceType::Native,
        } => Box::new(ReplayReader::open(path, options)?),
        SourceDescriptor::Foreign { path, format } => {
            Box::new(ImportReader::open(path, *format, options)?)
        }
    };
    Ok(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_source_type_names() {
        assert_eq!(ImportSourceType::DirectParse.to_string(), "direct-parse");
        assert_eq!(
            "dvs-parse".parse::<ImportSourceType>().unwrap(),
            ImportSourceType::DvsParse
        );
        assert_eq!(
            ImportSourceType::from_path(Path::new("old/fight.DPD")),
            Some(ImportSourceType::DirectParse)
        );
        assert_eq!(ImportSourceType::from_path(Path::new("fight.txt")), None);
    }

    #[test]
    fn test_descriptor_kinds() {
        let store = SourceDescriptor::Store {
            path: PathBuf::from("a.blog"),
        };
        assert_eq!(store.kind(), SourceKind::Replay);
        let native = SourceDescriptor::Foreign {
            path: PathBuf::from("a.blog"),
            format: ImportSourceType::Native,
        };
        assert_eq!(native.kind(), SourceKind::Replay);
        let memory = SourceDescriptor::Memory {
            process_name: "pol.exe".to_string(),
            layout: ChatLogLayout::default(),
        };
        assert_eq!(memory.kind(), SourceKind::Live);
        assert!(memory.path().is_none());
    }

    #[test]
    fn test_descriptor_serde() {
        let descriptor = SourceDescriptor::Foreign {
            path: PathBuf::from("x.dvsd"),
            format: ImportSourceType::DvsParse,
        };
        let json = serde_json::to_string(&descriptor).unwrap();
        assert_eq!(json, r#"{"kind":"foreign","path":"x.dvsd","format":"dvs_parse"}"#);
        let back: SourceDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn test_slot_addressing_wraps() {
        let layout = ChatLogLayout {
            address: 0x1000,
            slot_count: 4,
            slot_size: 64,
        };
        assert_eq!(layout.slot_address(0), 0x1008);
        assert_eq!(layout.slot_address(5), 0x1008 + 64);
        assert_eq!(layout.byte_len(), 8 + 256);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let descriptor = SourceDescriptor::LogFile {
            path: PathBuf::from("/nonexistent/capture.bin"),
        };
        let err = open_reader(&descriptor, &ReaderOptions::default())
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }
}
