//! Readers for foreign parser exports.
//!
//! Both supported formats are a small header carrying the entry count,
//! followed by length-delimited entries. Only chat-line entries become
//! records; other entry kinds are skipped with a warning.

mod direct;
mod dvs;

pub use direct::DirectParseFormat;
pub use dvs::DvsParseFormat;

use std::fs;
use std::path::Path;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::process::ByteBuffer;
use crate::record::{EventRecord, Provenance};
use crate::source::{
    CancelToken, ImportSourceType, ProgressState, ProgressStatus, ReadOutcome, ReaderOptions,
    SourceKind, SourceReader,
};
use crate::store::format::resolve_naive;

/// Entry kind carrying a chat line.
pub const ENTRY_CHAT_LINE: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignEntry {
    pub kind: u8,
    pub timestamp: DateTime<Utc>,
    /// `None` for kinds the format does not interpret.
    pub text: Option<String>,
}

/// Binary layout of one foreign export format.
pub trait ForeignFormat: Send {
    /// Parse the header, returning the declared entry count.
    fn read_header(&self, buf: &mut ByteBuffer<'_>) -> Result<u32>;

    fn read_entry(&self, buf: &mut ByteBuffer<'_>) -> Result<ForeignEntry>;
}

fn format_for(source: ImportSourceType) -> Result<Box<dyn ForeignFormat>> {
    match source {
        ImportSourceType::DirectParse => Ok(Box::new(DirectParseFormat)),
        ImportSourceType::DvsParse => Ok(Box::new(DvsParseFormat)),
        ImportSourceType::Native => Err(Error::decode(
            0,
            "native stores are replayed, not imported",
        )),
    }
}

/// Reads records out of a foreign export file.
pub struct ImportReader {
    source: ImportSourceType,
    format: Box<dyn ForeignFormat>,
    data: Vec<u8>,
    position: usize,
    declared: u32,
    consumed: u32,
    next_sequence: u64,
    upgrade: Option<FixedOffset>,
    cancel: CancelToken,
    progress: ProgressStatus,
}

impl ImportReader {
    pub fn open<P: AsRef<Path>>(
        path: P,
        source: ImportSourceType,
        options: &ReaderOptions,
    ) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        Self::from_bytes(data, source, options)
    }

    pub fn from_bytes(
        data: Vec<u8>,
        source: ImportSourceType,
        options: &ReaderOptions,
    ) -> Result<Self> {
        let format = format_for(source)?;
        let mut buf = ByteBuffer::new(&data);
        let declared = format.read_header(&mut buf)?;
        let position = buf.position();
        debug!("{} export declares {} entries", source, declared);

        Ok(Self {
            source,
            format,
            data,
            position,
            declared,
            consumed: 0,
            next_sequence: 1,
            upgrade: options.timestamp_upgrade,
            cancel: options.cancel.clone(),
            progress: ProgressStatus::with_total(declared as u64),
        })
    }

    fn decode_next(&mut self) -> Result<Option<EventRecord>> {
        loop {
            self.cancel.check()?;
            if self.consumed == self.declared {
                let trailing = self.data.len() - self.position;
                if trailing > 0 {
                    warn!("Ignoring {} trailing bytes after last entry", trailing);
                }
                return Ok(None);
            }

            let mut buf = ByteBuffer::with_origin(&self.data[self.position..], self.position as u64);
            let entry = self.format.read_entry(&mut buf)?;
            self.position += buf.position();
            self.consumed += 1;

            let Some(text) = entry.text else {
                warn!(
                    "Skipping {} entry {} of unknown kind {}",
                    self.source, self.consumed, entry.kind
                );
                self.progress.record_warning();
                continue;
            };

            let timestamp = match self.upgrade {
                Some(offset) => resolve_naive(entry.timestamp.naive_utc(), Some(offset)),
                None => entry.timestamp,
            };
            let record = EventRecord::decode(
                self.next_sequence,
                timestamp,
                Provenance::Import(self.source),
                text,
            )?;
            self.next_sequence += 1;
            return Ok(Some(record));
        }
    }
}

impl SourceReader for ImportReader {
    fn kind(&self) -> SourceKind {
        SourceKind::Import
    }

    fn next(&mut self) -> Result<ReadOutcome> {
        if self.progress.is_terminal() {
            return Ok(ReadOutcome::EndOfStream);
        }
        match self.decode_next() {
            Ok(Some(record)) => {
                self.progress.record_processed();
                Ok(ReadOutcome::Record(record))
            }
            Ok(None) => {
                self.progress.finish(ProgressState::Completed);
                Ok(ReadOutcome::EndOfStream)
            }
            Err(e) => {
                self.progress.finish(ProgressState::Failed);
                Err(e)
            }
        }
    }

    fn progress(&self) -> ProgressStatus {
        self.progress.clone()
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}
