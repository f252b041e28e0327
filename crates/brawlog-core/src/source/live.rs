//! Live capture reader.
//!
//! A `LiveReader` pulls bytes from a `FrameSource`, frames them, and decodes
//! each frame's chat line. Corrupt frames and undecodable lines are logged and
//! counted, never fatal. An empty poll sleeps for the poll interval and yields
//! `ReadOutcome::Idle` so the caller can check for stop requests.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::polling::MAX_POLL_BYTES;
use crate::error::Result;
use crate::process::ReadMemory;
use crate::record::{EventRecord, Provenance, decode_line};
use crate::retry::{ExponentialBackoff, RetryStrategy};
use crate::source::frame::{FrameDecoder, FrameEvent};
use crate::source::{
    CancelToken, ChatLogLayout, ProgressState, ProgressStatus, ReadOutcome, ReaderOptions,
    SourceKind, SourceReader,
};

/// Result of polling a frame source once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePoll {
    Data(Vec<u8>),
    Empty,
    Closed,
}

/// Raw byte feed behind a live reader.
pub trait FrameSource: Send {
    fn poll(&mut self) -> Result<SourcePoll>;

    /// Whether a fresh reader sees the same bytes again from the beginning.
    /// Resuming a rescannable source skips already-captured records; other
    /// sources continue numbering from where the store left off.
    fn rescannable(&self) -> bool;

    fn describe(&self) -> String;
}

/// Follows a growing frame log on disk.
pub struct LogTailSource {
    path: PathBuf,
    file: File,
    position: u64,
}

impl LogTailSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file,
            position: 0,
        })
    }
}

impl FrameSource for LogTailSource {
    fn poll(&mut self) -> Result<SourcePoll> {
        let len = self.file.metadata()?.len();
        if len < self.position {
            warn!(
                "Capture log {} shrank from {} to {} bytes; closing",
                self.path.display(),
                self.position,
                len
            );
            return Ok(SourcePoll::Closed);
        }
        if len == self.position {
            return Ok(SourcePoll::Empty);
        }

        self.file.seek(SeekFrom::Start(self.position))?;
        let want = ((len - self.position) as usize).min(MAX_POLL_BYTES);
        let mut buf = vec![0u8; want];
        let read = self.file.read(&mut buf)?;
        buf.truncate(read);
        self.position += read as u64;

        if buf.is_empty() {
            Ok(SourcePoll::Empty)
        } else {
            Ok(SourcePoll::Data(buf))
        }
    }

    fn rescannable(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("log file {}", self.path.display())
    }
}

/// Reads frames out of the game client's chat ring.
///
/// ```text
/// address + 0                     u32 lines written so far
/// address + 8 + i * slot_size     slot i: u16 frame length, frame bytes
/// ```
///
/// Line `n` lives in slot `n % slot_count`. Only lines written after the
/// first poll are captured.
pub struct MemoryFrameSource<R, S = ExponentialBackoff> {
    reader: R,
    layout: ChatLogLayout,
    retry: S,
    next_line: Option<u64>,
}

impl<R: ReadMemory> MemoryFrameSource<R> {
    pub fn new(reader: R, layout: ChatLogLayout) -> Self {
        Self::with_retry(reader, layout, ExponentialBackoff::new())
    }
}

impl<R: ReadMemory, S: RetryStrategy> MemoryFrameSource<R, S> {
    pub fn with_retry(reader: R, layout: ChatLogLayout, retry: S) -> Self {
        Self {
            reader,
            layout,
            retry,
            next_line: None,
        }
    }

    fn read_slot(&self, line: u64) -> Result<Vec<u8>> {
        let address = self.layout.slot_address(line);
        let max_len = self.layout.slot_size.saturating_sub(2) as usize;
        let len = self
            .retry
            .execute(|_| self.reader.read_u16(address))? as usize;
        if len > max_len {
            debug!("Slot for line {} declares {} bytes, clamping", line, len);
        }
        self.retry
            .execute(|_| self.reader.read_bytes(address + 2, len.min(max_len)))
    }

    /// The ring's line counter and the frames it still holds, oldest first.
    pub fn read_ring(&self) -> Result<(u64, Vec<u8>)> {
        let written = self
            .retry
            .execute(|_| self.reader.read_u32(self.layout.address))? as u64;
        let held = written.min(self.layout.slot_count.max(1) as u64);
        let mut bytes = Vec::new();
        for line in written - held..written {
            bytes.extend_from_slice(&self.read_slot(line)?);
        }
        Ok((written, bytes))
    }
}

impl<R, S> FrameSource for MemoryFrameSource<R, S>
where
    R: ReadMemory + Send,
    S: RetryStrategy + Send,
{
    fn poll(&mut self) -> Result<SourcePoll> {
        let written = match self
            .retry
            .execute(|_| self.reader.read_u32(self.layout.address))
        {
            Ok(count) => count as u64,
            Err(e) => {
                warn!("Chat log unreadable, treating client as gone: {}", e);
                return Ok(SourcePoll::Closed);
            }
        };

        let mut next = *self.next_line.get_or_insert(written);
        if written < next {
            warn!(
                "Chat log counter went backwards ({} -> {}), following new position",
                next, written
            );
            self.next_line = Some(written);
            return Ok(SourcePoll::Empty);
        }
        if written == next {
            return Ok(SourcePoll::Empty);
        }

        let capacity = self.layout.slot_count.max(1) as u64;
        if written - next > capacity {
            let lost = written - next - capacity;
            warn!("{} chat lines overwritten before they could be read", lost);
            next = written - capacity;
        }

        let mut bytes = Vec::new();
        for line in next..written {
            match self.read_slot(line) {
                Ok(frame) => bytes.extend_from_slice(&frame),
                Err(e) => {
                    warn!("Chat log slot unreadable, treating client as gone: {}", e);
                    self.next_line = Some(line);
                    if bytes.is_empty() {
                        return Ok(SourcePoll::Closed);
                    }
                    return Ok(SourcePoll::Data(bytes));
                }
            }
        }
        self.next_line = Some(written);
        Ok(SourcePoll::Data(bytes))
    }

    fn rescannable(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!("chat log at {:#x}", self.layout.address)
    }
}

/// Reader over a live frame source.
pub struct LiveReader {
    source: Box<dyn FrameSource>,
    decoder: FrameDecoder,
    next_sequence: u64,
    /// Decoded records still to be passed over when resuming a rescan.
    skip_remaining: u64,
    poll_interval: Duration,
    cancel: CancelToken,
    progress: ProgressStatus,
    closed: bool,
}

impl LiveReader {
    pub fn new(source: Box<dyn FrameSource>, options: &ReaderOptions) -> Self {
        let (next_sequence, skip_remaining) = if source.rescannable() {
            (1, options.resume_after)
        } else {
            (options.resume_after + 1, 0)
        };
        if options.resume_after > 0 {
            info!(
                "Resuming {} after sequence {}",
                source.describe(),
                options.resume_after
            );
        }

        Self {
            source,
            decoder: FrameDecoder::new(),
            next_sequence,
            skip_remaining,
            poll_interval: options.poll_interval,
            cancel: options.cancel.clone(),
            progress: ProgressStatus::open_ended(),
            closed: false,
        }
    }

    pub fn skipped_frames(&self) -> u64 {
        self.progress.skipped
    }

    fn skip_frame(&mut self, reason: &str) {
        warn!("Skipping frame: {}", reason);
        self.progress.record_skipped();
    }

    fn next_decoded(&mut self) -> Option<EventRecord> {
        while let Some(event) = self.decoder.next_event() {
            match event {
                FrameEvent::Frame(frame) => match decode_line(&frame.line) {
                    Ok(payload) => {
                        if self.skip_remaining > 0 {
                            self.skip_remaining -= 1;
                            self.next_sequence += 1;
                            continue;
                        }
                        let record = EventRecord {
                            sequence: self.next_sequence,
                            timestamp: frame.timestamp,
                            provenance: Provenance::Live,
                            payload,
                            raw: frame.line,
                        };
                        self.next_sequence += 1;
                        self.progress.record_processed();
                        return Some(record);
                    }
                    Err(e) => self.skip_frame(&format!("undecodable chat line: {}", e)),
                },
                FrameEvent::Corrupt { position, reason } => {
                    self.skip_frame(&format!("{} at offset {}", reason, position))
                }
            }
        }
        None
    }
}

impl SourceReader for LiveReader {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn next(&mut self) -> Result<ReadOutcome> {
        loop {
            if let Err(e) = self.cancel.check() {
                self.progress.finish(ProgressState::Failed);
                return Err(e);
            }

            if let Some(record) = self.next_decoded() {
                return Ok(ReadOutcome::Record(record));
            }

            if self.closed {
                if self.decoder.buffered() > 0 {
                    self.skip_frame("truncated frame at end of stream");
                }
                info!("{} closed", self.source.describe());
                self.progress.finish(ProgressState::Completed);
                return Ok(ReadOutcome::EndOfStream);
            }

            match self.source.poll() {
                Ok(SourcePoll::Data(bytes)) => self.decoder.push(&bytes),
                Ok(SourcePoll::Empty) => {
                    std::thread::sleep(self.poll_interval);
                    return Ok(ReadOutcome::Idle);
                }
                Ok(SourcePoll::Closed) => self.closed = true,
                Err(e) => {
                    self.progress.finish(ProgressState::Failed);
                    return Err(e);
                }
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
    use crate::config::frame::HEADER_LEN;
    use crate::process::{MockMemoryBuilder, MockMemoryReader};
    use crate::record::{format_line, line::codes};
    use crate::retry::NoRetry;
    use crate::source::frame::encode_frame;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::VecDeque;

    struct ScriptedSource {
        polls: VecDeque<SourcePoll>,
        rescannable: bool,
    }

    impl ScriptedSource {
        fn boxed(polls: Vec<SourcePoll>, rescannable: bool) -> Box<dyn FrameSource> {
            Box::new(Self {
                polls: polls.into(),
                rescannable,
            })
        }
    }

    impl FrameSource for ScriptedSource {
        fn poll(&mut self) -> Result<SourcePoll> {
            Ok(self.polls.pop_front().unwrap_or(SourcePoll::Closed))
        }

        fn rescannable(&self) -> bool {
            self.rescannable
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_238_600_000 + secs, 0).unwrap()
    }

    fn say(n: u32) -> Vec<u8> {
        encode_frame(ts(n as i64), &format_line(codes::SAY, &format!("Alice : line {}", n)))
    }

    fn options() -> ReaderOptions {
        ReaderOptions {
            poll_interval: Duration::from_millis(1),
            ..ReaderOptions::default()
        }
    }

    fn drain(reader: &mut LiveReader) -> Vec<EventRecord> {
        let mut records = Vec::new();
        loop {
            match reader.next().unwrap() {
                ReadOutcome::Record(r) => records.push(r),
                ReadOutcome::Idle => {}
                ReadOutcome::EndOfStream => return records,
            }
        }
    }

    #[test]
    fn test_corrupt_frame_is_skipped() {
        let mut bytes = say(0);
        bytes[HEADER_LEN] ^= 0x01;
        for n in 1..=3 {
            bytes.extend(say(n));
        }

        let mut reader = LiveReader::new(
            ScriptedSource::boxed(vec![SourcePoll::Data(bytes)], false),
            &options(),
        );
        let records = drain(&mut reader);

        assert_eq!(records.len(), 3);
        assert_eq!(
            records.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        let progress = reader.progress();
        assert_eq!(progress.skipped, 1);
        assert_eq!(progress.total, None);
        assert_eq!(progress.state, ProgressState::Completed);
    }

    #[test]
    fn test_corrupt_length_skips_only_that_frame() {
        let mut bytes = say(0);
        bytes[2] += 20;
        for n in 1..=3 {
            bytes.extend(say(n));
        }

        let mut reader = LiveReader::new(
            ScriptedSource::boxed(vec![SourcePoll::Data(bytes)], false),
            &options(),
        );
        let records = drain(&mut reader);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].timestamp, ts(1));
        assert_eq!(reader.progress().skipped, 1);
    }

    #[test]
    fn test_empty_poll_yields_idle() {
        let mut reader = LiveReader::new(
            ScriptedSource::boxed(vec![SourcePoll::Empty, SourcePoll::Data(say(1))], false),
            &options(),
        );
        assert_eq!(reader.next().unwrap(), ReadOutcome::Idle);
        assert!(matches!(reader.next().unwrap(), ReadOutcome::Record(_)));
        assert_eq!(reader.next().unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn test_undecodable_line_is_skipped() {
        let mut bytes = encode_frame(ts(0), "not a chat line");
        bytes.extend(say(1));
        let mut reader = LiveReader::new(
            ScriptedSource::boxed(vec![SourcePoll::Data(bytes)], false),
            &options(),
        );
        assert_eq!(drain(&mut reader).len(), 1);
        assert_eq!(reader.skipped_frames(), 1);
    }

    #[test]
    fn test_resume_rescannable_skips_captured_records() {
        let bytes: Vec<u8> = (1..=5).flat_map(say).collect();
        let opts = ReaderOptions {
            resume_after: 3,
            ..options()
        };
        let mut reader =
            LiveReader::new(ScriptedSource::boxed(vec![SourcePoll::Data(bytes)], true), &opts);

        let records = drain(&mut reader);
        assert_eq!(
            records.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            vec![4, 5]
        );
        assert!(records[0].raw.ends_with("line 4"));
    }

    #[test]
    fn test_resume_stream_continues_numbering() {
        let opts = ReaderOptions {
            resume_after: 10,
            ..options()
        };
        let mut reader =
            LiveReader::new(ScriptedSource::boxed(vec![SourcePoll::Data(say(1))], false), &opts);
        let records = drain(&mut reader);
        assert_eq!(records[0].sequence, 11);
    }

    #[test]
    fn test_cancel_fails_reader() {
        let mut reader = LiveReader::new(ScriptedSource::boxed(vec![], false), &options());
        reader.cancel();
        assert!(reader.next().unwrap_err().is_cancelled());
        assert_eq!(reader.progress().state, ProgressState::Failed);
    }

    #[test]
    fn test_log_tail_follows_growth() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.bin");
        let mut file = File::create(&path).unwrap();
        file.write_all(&say(1)).unwrap();
        file.flush().unwrap();

        let mut source = LogTailSource::open(&path).unwrap();
        assert!(matches!(source.poll().unwrap(), SourcePoll::Data(_)));
        assert_eq!(source.poll().unwrap(), SourcePoll::Empty);

        file.write_all(&say(2)).unwrap();
        file.flush().unwrap();
        assert_eq!(source.poll().unwrap(), SourcePoll::Data(say(2)));
    }

    fn layout() -> ChatLogLayout {
        ChatLogLayout {
            address: 0x1000,
            slot_count: 4,
            slot_size: 256,
        }
    }

    fn write_line(memory: &MockMemoryReader, n: u32) {
        let layout = layout();
        let frame = say(n);
        let slot = layout.slot_address(n as u64);
        memory.write_bytes(slot, &(frame.len() as u16).to_le_bytes());
        memory.write_bytes(slot + 2, &frame);
        memory.write_u32(layout.address, n + 1);
    }

    #[test]
    fn test_memory_source_reads_new_lines() {
        let memory = MockMemoryBuilder::new()
            .with_size(layout().byte_len())
            .build();
        let mut source = MemoryFrameSource::with_retry(memory.clone(), layout(), NoRetry::new());

        assert_eq!(source.poll().unwrap(), SourcePoll::Empty);
        write_line(&memory, 0);
        write_line(&memory, 1);
        assert_eq!(
            source.poll().unwrap(),
            SourcePoll::Data([say(0), say(1)].concat())
        );
        assert_eq!(source.poll().unwrap(), SourcePoll::Empty);
    }

    #[test]
    fn test_memory_source_overrun_keeps_latest_lines() {
        let memory = MockMemoryBuilder::new()
            .with_size(layout().byte_len())
            .build();
        let mut source = MemoryFrameSource::with_retry(memory.clone(), layout(), NoRetry::new());
        assert_eq!(source.poll().unwrap(), SourcePoll::Empty);

        for n in 0..6 {
            write_line(&memory, n);
        }
        assert_eq!(
            source.poll().unwrap(),
            SourcePoll::Data((2..6).flat_map(say).collect())
        );
    }

    #[test]
    fn test_memory_source_closes_when_detached() {
        let memory = MockMemoryBuilder::new()
            .with_size(layout().byte_len())
            .build();
        let mut source = MemoryFrameSource::with_retry(memory.clone(), layout(), NoRetry::new());
        memory.detach();
        assert_eq!(source.poll().unwrap(), SourcePoll::Closed);
    }
}
