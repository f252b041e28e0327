//! Live source probing

use std::collections::BTreeMap;
use std::fs;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::process::{MemoryReader, ReadMemory};
use crate::record::{PayloadKind, decode_line, line::line_code};
use crate::retry::RetryStrategy;
use crate::source::frame::{FrameDecoder, FrameEvent};
use crate::source::{ChatLogLayout, MemoryFrameSource, SourceDescriptor, attach};

/// What a live source currently holds
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Human readable source description
    pub source: String,
    /// Bytes read from the source
    pub bytes_available: u64,
    /// Frames that passed the checksum
    pub frames_decoded: u64,
    /// Corrupt frames and garbage runs
    pub corrupt_frames: u64,
    /// Frames whose chat line could not be decoded
    pub undecodable_lines: u64,
    pub kind_counts: BTreeMap<PayloadKind, u64>,
    /// Frames per chat code, keyed by the two-digit hex code
    pub code_counts: BTreeMap<String, u64>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    /// Lines the client has written so far (memory sources only)
    pub ring_counter: Option<u64>,
}

impl ScanReport {
    /// Probe a live source once.
    pub fn probe(source: &SourceDescriptor) -> Result<Self> {
        match source {
            SourceDescriptor::LogFile { path } => {
                let bytes = fs::read(path)?;
                Ok(Self::from_bytes(source.to_string(), &bytes))
            }
            SourceDescriptor::Memory {
                process_name,
                layout,
            } => {
                let reader = MemoryReader::new(attach(process_name)?);
                let source = MemoryFrameSource::new(reader, layout.clone());
                Self::probe_ring(&source, layout)
            }
            other => Err(Error::NotLiveSource(other.to_string())),
        }
    }

    /// Probe the frames still held in a chat ring.
    pub fn probe_ring<R, S>(source: &MemoryFrameSource<R, S>, layout: &ChatLogLayout) -> Result<Self>
    where
        R: ReadMemory,
        S: RetryStrategy,
    {
        let (written, bytes) = source.read_ring()?;
        debug!("Chat ring at {:#x} has written {} lines", layout.address, written);
        let mut report = Self::from_bytes(format!("chat log at {:#x}", layout.address), &bytes);
        report.ring_counter = Some(written);
        Ok(report)
    }

    /// Decode every frame in `bytes`.
    pub fn from_bytes(source: String, bytes: &[u8]) -> Self {
        let mut report = Self {
            source,
            bytes_available: bytes.len() as u64,
            ..Self::default()
        };

        let mut decoder = FrameDecoder::new();
        decoder.push(bytes);
        while let Some(event) = decoder.next_event() {
            match event {
                FrameEvent::Frame(frame) => {
                    report.frames_decoded += 1;
                    report.first_timestamp.get_or_insert(frame.timestamp);
                    report.last_timestamp = Some(frame.timestamp);
                    if let Some(code) = line_code(&frame.line) {
                        *report.code_counts.entry(format!("{:02x}", code)).or_default() += 1;
                    }
                    match decode_line(&frame.line) {
                        Ok(payload) => *report.kind_counts.entry(payload.kind()).or_default() += 1,
                        Err(_) => report.undecodable_lines += 1,
                    }
                }
                FrameEvent::Corrupt { .. } => report.corrupt_frames += 1,
            }
        }
        if decoder.buffered() > 0 {
            debug!("{} trailing bytes form no complete frame", decoder.buffered());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockMemoryBuilder;
    use crate::record::{format_line, line::codes};
    use crate::retry::NoRetry;
    use crate::source::encode_frame;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 7, 3, 21, 0, second).unwrap()
    }

    fn frame(second: u32, code: u16, text: &str) -> Vec<u8> {
        encode_frame(at(second), &format_line(code, text))
    }

    #[test]
    fn test_from_bytes_counts_frames_and_kinds() {
        let mut bytes = frame(1, codes::SAY, "Alice : hello");
        bytes.extend_from_slice(b"\xff\xff\xff");
        bytes.extend(frame(2, codes::HEAL, "Alice heals Bob for 40 hit points."));
        bytes.extend(frame(3, codes::SAY, "Bob : thanks"));

        let report = ScanReport::from_bytes("test".to_string(), &bytes);
        assert_eq!(report.frames_decoded, 3);
        assert_eq!(report.corrupt_frames, 1);
        assert_eq!(report.kind_counts.get(&PayloadKind::Chat), Some(&2));
        assert_eq!(report.kind_counts.get(&PayloadKind::Action), Some(&1));
        assert_eq!(report.code_counts.get(&format!("{:02x}", codes::SAY)), Some(&2));
        assert_eq!(report.first_timestamp, Some(at(1)));
        assert_eq!(report.last_timestamp, Some(at(3)));
        assert_eq!(report.ring_counter, None);
    }

    #[test]
    fn test_probe_ring_reports_counter() {
        let layout = ChatLogLayout {
            address: 0x1000,
            slot_count: 2,
            slot_size: 256,
        };
        let memory = MockMemoryBuilder::new()
            .with_size(layout.byte_len())
            .build();
        for n in 0..3u32 {
            let bytes = frame(n, codes::SAY, &format!("Alice : line {}", n));
            let slot = layout.slot_address(n as u64);
            memory.write_bytes(slot, &(bytes.len() as u16).to_le_bytes());
            memory.write_bytes(slot + 2, &bytes);
            memory.write_u32(layout.address, n + 1);
        }

        let source = MemoryFrameSource::with_retry(memory, layout.clone(), NoRetry::new());
        let report = ScanReport::probe_ring(&source, &layout).unwrap();
        assert_eq!(report.ring_counter, Some(3));
        assert_eq!(report.frames_decoded, 2);
        assert_eq!(report.first_timestamp, Some(at(1)));
    }

    #[test]
    fn test_probe_rejects_store_source() {
        let source = SourceDescriptor::Store {
            path: PathBuf::from("fight.blog"),
        };
        assert!(matches!(
            ScanReport::probe(&source),
            Err(Error::NotLiveSource(_))
        ));
    }

    #[test]
    fn test_report_serializes() {
        let report = ScanReport::from_bytes("log".to_string(), &frame(5, codes::SAY, "A : b"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["frames_decoded"], 1);
        assert_eq!(json["kind_counts"]["chat"], 1);
    }
}
