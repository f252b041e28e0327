//! DVSParse export (`.dvsd`).
//!
//! ```text
//! header:  "DVSD" | version u16 | entry count u32
//! entry:   timestamp u32 (s since 2002-01-01 UTC) | kind u8 | length u32 | body
//! ```

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::process::ByteBuffer;
use crate::source::import::{ENTRY_CHAT_LINE, ForeignEntry, ForeignFormat};

const MAGIC: &[u8; 4] = b"DVSD";
const SUPPORTED_VERSIONS: [u16; 2] = [1, 2];

/// 2002-01-01T00:00:00Z
const EPOCH_UNIX_SECS: i64 = 1_009_843_200;

#[derive(Debug, Clone, Copy, Default)]
pub struct DvsParseFormat;

fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(EPOCH_UNIX_SECS, 0).unwrap_or_default()
}

impl ForeignFormat for DvsParseFormat {
    fn read_header(&self, buf: &mut ByteBuffer<'_>) -> Result<u32> {
        let start = buf.absolute_position();
        if buf.read_bytes(4)? != MAGIC {
            return Err(Error::decode(start, "missing DVSParse signature"));
        }
        let version = buf.read_u16()?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(Error::decode(
                start + 4,
                format!("unsupported DVSParse version {}", version),
            ));
        }
        buf.read_u32()
    }

    fn read_entry(&self, buf: &mut ByteBuffer<'_>) -> Result<ForeignEntry> {
        let secs = buf.read_u32()?;
        let kind = buf.read_u8()?;
        let len = buf.read_u32()? as usize;
        let body = buf.read_bytes(len)?;

        let text = (kind == ENTRY_CHAT_LINE).then(|| crate::process::decode_shift_jis(body));

        Ok(ForeignEntry {
            kind,
            timestamp: epoch() + Duration::seconds(secs as i64),
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{format_line, line::codes};
    use crate::source::import::ImportReader;
    use crate::source::{ImportSourceType, ReadOutcome, ReaderOptions, SourceReader};
    use chrono::TimeZone;

    fn entry(secs: u32, kind: u8, body: &[u8]) -> Vec<u8> {
        let mut out = secs.to_le_bytes().to_vec();
        out.push(kind);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_epoch_is_2002() {
        assert_eq!(epoch(), Utc.with_ymd_and_hms(2002, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_reads_chat_entries() {
        let line = format_line(codes::LINKSHELL, "Carol : gg");
        let mut data = b"DVSD".to_vec();
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend(entry(60, ENTRY_CHAT_LINE, line.as_bytes()));
        data.extend(entry(61, 4, &[1, 2, 3]));

        let mut reader =
            ImportReader::from_bytes(data, ImportSourceType::DvsParse, &ReaderOptions::default())
                .unwrap();

        match reader.next().unwrap() {
            ReadOutcome::Record(record) => {
                assert_eq!(record.raw, line);
                assert_eq!(
                    record.timestamp,
                    Utc.with_ymd_and_hms(2002, 1, 1, 0, 1, 0).unwrap()
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(reader.next().unwrap(), ReadOutcome::EndOfStream);
        assert_eq!(reader.progress().warnings, 1);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut data = b"DVSD".to_vec();
        data.extend_from_slice(&7u16.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        assert!(
            DvsParseFormat
                .read_header(&mut ByteBuffer::new(&data))
                .is_err()
        );
    }
}
