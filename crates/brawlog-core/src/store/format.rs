//! On-disk store format.
//!
//! A store file is JSON lines: a header object followed by one object per
//! record, in apply order.
//!
//! ```text
//! {"format":"brawlog-store","version":2,"origin":{...},"created":"2009-04-01T20:15:00Z"}
//! {"seq":1,"ts":"2009-04-01T20:15:03Z","prov":"live","raw":"...","payload":{...}}
//! ```
//!
//! Version 1 stores wrote timestamps without an offset. They are read as UTC
//! unless a timestamp upgrade supplies the offset they were recorded in.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::{EventRecord, Payload, Provenance};
use crate::source::SourceDescriptor;

pub const FORMAT_NAME: &str = "brawlog-store";
pub const CURRENT_VERSION: u32 = 2;
pub const LEGACY_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreHeader {
    pub format: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<SourceDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl StoreHeader {
    pub fn new(origin: Option<SourceDescriptor>) -> Self {
        Self {
            format: FORMAT_NAME.to_string(),
            version: CURRENT_VERSION,
            origin,
            created: Some(Utc::now()),
        }
    }

    pub fn is_legacy(&self) -> bool {
        self.version < CURRENT_VERSION
    }
}

#[derive(Serialize)]
struct RecordLine<'a> {
    seq: u64,
    ts: &'a DateTime<Utc>,
    prov: Provenance,
    raw: &'a str,
    payload: &'a Payload,
}

/// Timestamp as found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StoredTimestamp {
    Utc(DateTime<Utc>),
    Naive(NaiveDateTime),
}

impl StoredTimestamp {
    /// Resolve to UTC. Naive values are interpreted in `offset`, or UTC.
    pub fn resolve(self, offset: Option<FixedOffset>) -> DateTime<Utc> {
        match self {
            StoredTimestamp::Utc(ts) => ts,
            StoredTimestamp::Naive(naive) => resolve_naive(naive, offset),
        }
    }
}

/// Interpret a wall-clock time recorded in `offset` (UTC when absent).
pub fn resolve_naive(naive: NaiveDateTime, offset: Option<FixedOffset>) -> DateTime<Utc> {
    match offset {
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
        None => Utc.from_utc_datetime(&naive),
    }
}

/// A record line before its payload is re-derived.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredRecord {
    pub seq: u64,
    pub ts: StoredTimestamp,
    pub prov: Provenance,
    pub raw: String,
}

impl StoredRecord {
    /// Rebuild the record, decoding the payload from the raw line.
    pub fn into_record(self, offset: Option<FixedOffset>) -> Result<EventRecord> {
        EventRecord::decode(self.seq, self.ts.resolve(offset), self.prov, self.raw)
    }
}

pub fn encode_header(header: &StoreHeader) -> Result<String> {
    Ok(serde_json::to_string(header)?)
}

pub fn encode_record(record: &EventRecord) -> Result<String> {
    let line = RecordLine {
        seq: record.sequence,
        ts: &record.timestamp,
        prov: record.provenance,
        raw: &record.raw,
        payload: &record.payload,
    };
    Ok(serde_json::to_string(&line)?)
}

/// Parse the first line of a store file. `line_no` is 1-based.
pub fn parse_header(line: &str, line_no: u64) -> Result<StoreHeader> {
    let header: StoreHeader = serde_json::from_str(line)
        .map_err(|e| Error::decode(line_no, format!("invalid store header: {}", e)))?;
    if header.format != FORMAT_NAME {
        return Err(Error::decode(
            line_no,
            format!("not a store file (format {:?})", header.format),
        ));
    }
    if !(LEGACY_VERSION..=CURRENT_VERSION).contains(&header.version) {
        return Err(Error::decode(
            line_no,
            format!("unsupported store version {}", header.version),
        ));
    }
    Ok(header)
}

pub fn parse_record(line: &str, line_no: u64) -> Result<StoredRecord> {
    serde_json::from_str(line)
        .map_err(|e| Error::decode(line_no, format!("invalid record line: {}", e)))
}

/// Serialize a whole store. Output is deterministic for identical input.
pub fn render<'a, I>(header: &StoreHeader, records: I) -> Result<String>
where
    I: IntoIterator<Item = &'a EventRecord>,
{
    let mut out = encode_header(header)?;
    out.push('\n');
    for record in records {
        out.push_str(&encode_record(record)?);
        out.push('\n');
    }
    Ok(out)
}

/// Write `content` to `path` via a sibling temp file and rename.
///
/// Readers of `path` see either the previous file or the complete new one.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    result.map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::Persistence(format!("failed to write {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{format_line, line::codes};

    fn record(seq: u64) -> EventRecord {
        let ts = Utc.with_ymd_and_hms(2009, 4, 1, 20, 15, seq as u32).unwrap();
        EventRecord::decode(
            seq,
            ts,
            Provenance::Live,
            format_line(codes::MELEE, "Alice hits the Goblin for 30 points of damage."),
        )
        .unwrap()
    }

    #[test]
    fn test_record_line_roundtrip() {
        let original = record(3);
        let line = encode_record(&original).unwrap();
        let restored = parse_record(&line, 2).unwrap().into_record(None).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_legacy_naive_timestamp() {
        let line = r#"{"seq":1,"ts":"2009-04-01T20:15:00","prov":"live","raw":"01,00,00,80808080,00000000,00000000,0005,00,01,00,00,A : hi"}"#;
        let stored = parse_record(line, 2).unwrap();
        assert!(matches!(stored.ts, StoredTimestamp::Naive(_)));

        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let upgraded = stored.into_record(Some(jst)).unwrap();
        assert_eq!(
            upgraded.timestamp,
            Utc.with_ymd_and_hms(2009, 4, 1, 11, 15, 0).unwrap()
        );
    }

    #[test]
    fn test_header_validation() {
        let header = StoreHeader::new(None);
        let line = encode_header(&header).unwrap();
        assert_eq!(parse_header(&line, 1).unwrap(), header);

        assert!(parse_header(r#"{"format":"other","version":2}"#, 1).is_err());
        assert!(parse_header(r#"{"format":"brawlog-store","version":9}"#, 1).is_err());
        assert!(
            parse_header(r#"{"format":"brawlog-store","version":1}"#, 1)
                .unwrap()
                .is_legacy()
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let header = StoreHeader::new(None);
        let records = vec![record(1), record(2)];
        assert_eq!(
            render(&header, &records).unwrap(),
            render(&header, &records).unwrap()
        );
    }

    #[test]
    fn test_atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fight.blog");

        atomic_write(&path, "first\n").unwrap();
        atomic_write(&path, "second\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
        assert!(!path.with_extension("tmp").exists());
    }
}
