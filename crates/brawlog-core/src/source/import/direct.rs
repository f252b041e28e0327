//! DirectParse export (`.dpd`).
//!
//! ```text
//! header:  "DPD\0" | version u32 | entry count u32
//! entry:   length u32 | kind u8 | timestamp i64 (unix s) | text length u16 | text
//! ```
//!
//! `length` covers everything after itself, so unknown kinds can be skipped.

use chrono::DateTime;

use crate::error::{Error, Result};
use crate::process::ByteBuffer;
use crate::source::import::{ENTRY_CHAT_LINE, ForeignEntry, ForeignFormat};

const MAGIC: &[u8; 4] = b"DPD\0";
const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectParseFormat;

impl ForeignFormat for DirectParseFormat {
    fn read_header(&self, buf: &mut ByteBuffer<'_>) -> Result<u32> {
        let start = buf.absolute_position();
        if buf.read_bytes(4)? != MAGIC {
            return Err(Error::decode(start, "missing DirectParse signature"));
        }
        let version = buf.read_u32()?;
        if version != SUPPORTED_VERSION {
            return Err(Error::decode(
                start + 4,
                format!("unsupported DirectParse version {}", version),
            ));
        }
        buf.read_u32()
    }

    fn read_entry(&self, buf: &mut ByteBuffer<'_>) -> Result<ForeignEntry> {
        let len = buf.read_u32()? as usize;
        let origin = buf.absolute_position();
        let mut body = ByteBuffer::with_origin(buf.read_bytes(len)?, origin);

        let kind = body.read_u8()?;
        let secs = body.read_i64()?;
        let timestamp = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| Error::decode(origin + 1, format!("timestamp out of range: {}", secs)))?;

        let text = if kind == ENTRY_CHAT_LINE {
            let text_len = body.read_u16()? as usize;
            Some(body.read_shift_jis(text_len)?)
        } else {
            None
        };

        Ok(ForeignEntry {
            kind,
            timestamp,
            text,
        })
    }
}
