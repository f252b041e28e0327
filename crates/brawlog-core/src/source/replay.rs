//! Replay of a previously persisted store file.

use std::fs;
use std::path::Path;

use chrono::FixedOffset;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::record::{EventRecord, Provenance};
use crate::source::{
    CancelToken, ProgressState, ProgressStatus, ReadOutcome, ReaderOptions, SourceKind,
    SourceReader,
};
use crate::store::format::{StoreHeader, parse_header, parse_record};

/// Re-reads a store file, re-deriving every payload from its raw line.
///
/// The total is known once the file is opened. Any malformed line ends the
/// stream with a decode error; nothing after it is produced.
pub struct ReplayReader {
    header: StoreHeader,
    lines: Vec<(u64, String)>,
    cursor: usize,
    next_sequence: u64,
    upgrade: Option<FixedOffset>,
    cancel: CancelToken,
    progress: ProgressStatus,
}

impl ReplayReader {
    pub fn open<P: AsRef<Path>>(path: P, options: &ReaderOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path)?;
        let mut numbered = content
            .lines()
            .enumerate()
            .map(|(i, line)| (i as u64 + 1, line))
            .filter(|(_, line)| !line.trim().is_empty());

        let header = match numbered.next() {
            Some((line_no, line)) => parse_header(line, line_no)?,
            None => return Err(Error::decode(0, "empty store file")),
        };
        let lines: Vec<(u64, String)> = numbered
            .map(|(line_no, line)| (line_no, line.to_string()))
            .collect();

        if header.is_legacy() {
            match options.timestamp_upgrade {
                Some(offset) => info!(
                    "Upgrading version {} timestamps in {} from offset {}",
                    header.version,
                    path.display(),
                    offset
                ),
                None => debug!("Reading version {} store as UTC", header.version),
            }
        }

        Ok(Self {
            header,
            progress: ProgressStatus::with_total(lines.len() as u64),
            lines,
            cursor: 0,
            next_sequence: 1,
            upgrade: options.timestamp_upgrade,
            cancel: options.cancel.clone(),
        })
    }

    fn decode_next(&mut self) -> Result<Option<EventRecord>> {
        let Some((line_no, line)) = self.lines.get(self.cursor) else {
            return Ok(None);
        };
        let stored = parse_record(line, *line_no)?;
        let upgrade = if self.header.is_legacy() {
            self.upgrade
        } else {
            None
        };
        let timestamp = stored.ts.resolve(upgrade);
        let record = EventRecord::decode(self.next_sequence, timestamp, Provenance::Replay, stored.raw)
            .map_err(|e| match e {
                Error::Decode { message, .. } => Error::decode(*line_no, message),
                other => other,
            })?;

        self.cursor += 1;
        self.next_sequence += 1;
        Ok(Some(record))
    }
}

impl SourceReader for ReplayReader {
    fn kind(&self) -> SourceKind {
        SourceKind::Replay
    }

    fn next(&mut self) -> Result<ReadOutcome> {
        if self.progress.is_terminal() {
            return Ok(ReadOutcome::EndOfStream);
        }
        let outcome = self.cancel.check().and_then(|_| self.decode_next());
        match outcome {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{format_line, line::codes};
    use crate::store::format::{StoreHeader, render};
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn write_store(dir: &Path, count: u64) -> PathBuf {
        let records: Vec<EventRecord> = (1..=count)
            .map(|seq| {
                EventRecord::decode(
                    seq,
                    Utc.timestamp_opt(1_238_600_000 + seq as i64, 0).unwrap(),
                    Provenance::Live,
                    format_line(codes::SAY, &format!("Alice : {}", seq)),
                )
                .unwrap()
            })
            .collect();
        let path = dir.join("fight.blog");
        fs::write(&path, render(&StoreHeader::new(None), &records).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_total_known_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_store(dir.path(), 4);
        let mut reader = ReplayReader::open(&path, &ReaderOptions::default()).unwrap();
        assert_eq!(reader.progress().total, Some(4));

        let mut sequences = Vec::new();
        while let ReadOutcome::Record(record) = reader.next().unwrap() {
            assert_eq!(record.provenance, Provenance::Replay);
            sequences.push(record.sequence);
        }
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        assert_eq!(reader.progress().state, ProgressState::Completed);
        assert_eq!(reader.progress().processed, 4);
    }

    #[test]
    fn test_malformed_line_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_store(dir.path(), 3);
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("{\"seq\":4,\"ts\":\n");
        fs::write(&path, content).unwrap();

        let mut reader = ReplayReader::open(&path, &ReaderOptions::default()).unwrap();
        for _ in 0..3 {
            assert!(matches!(reader.next().unwrap(), ReadOutcome::Record(_)));
        }
        let err = reader.next().unwrap_err();
        assert!(matches!(err, Error::Decode { position: 5, .. }));
        assert_eq!(reader.progress().state, ProgressState::Failed);
        assert_eq!(reader.progress().processed, 3);
    }

    #[test]
    fn test_not_a_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "hello\n").unwrap();
        assert!(ReplayReader::open(&path, &ReaderOptions::default()).is_err());
    }

    #[test]
    fn test_upgrade_only_touches_legacy_stores() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_store(dir.path(), 1);
        let options = ReaderOptions {
            timestamp_upgrade: FixedOffset::east_opt(3600),
            ..ReaderOptions::default()
        };
        let mut reader = ReplayReader::open(&path, &options).unwrap();
        match reader.next().unwrap() {
            ReadOutcome::Record(record) => assert_eq!(
                record.timestamp,
                Utc.timestamp_opt(1_238_600_001, 0).unwrap()
            ),
            other => panic!("unexpected {:?}", other),
        }
    }
}
