//! Byte buffer utilities for decoding binary frames and import files.
//!
//! `ByteBuffer` is a position-tracking little-endian reader. Every read that
//! runs past the end of the data yields a decode error carrying the position
//! where it happened, which is how truncated input surfaces to the readers.

use std::borrow::Cow;

use encoding_rs::SHIFT_JIS;
use tracing::debug;

use crate::error::{Error, Result};

/// A position-tracking byte reader for binary formats.
///
/// # Example
///
/// ```
/// use brawlog_core::process::ByteBuffer;
///
/// let data = [0x42, 0x4B, 0x05, 0x00];
/// let mut buf = ByteBuffer::new(&data);
///
/// assert_eq!(buf.read_u16().unwrap(), 0x4B42);
/// assert_eq!(buf.read_u16().unwrap(), 5);
/// assert_eq!(buf.remaining(), 0);
/// ```
pub struct ByteBuffer<'a> {
    data: &'a [u8],
    pos: usize,
    /// Absolute position of `data[0]` in the enclosing stream.
    origin: u64,
}

impl<'a> ByteBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            origin: 0,
        }
    }

    /// Creates a buffer whose error positions are reported relative to
    /// `origin` rather than the start of `data`.
    pub fn with_origin(data: &'a [u8], origin: u64) -> Self {
        Self {
            data,
            pos: 0,
            origin,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Position in the enclosing stream.
    pub fn absolute_position(&self) -> u64 {
        self.origin + self.pos as u64
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    /// Reads an unsigned 16-bit integer (little-endian) and advances the position.
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads an unsigned 32-bit integer (little-endian) and advances the position.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a signed 64-bit integer (little-endian) and advances the position.
    pub fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.read_bytes(8)?;
        Ok(i64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    /// Reads the specified number of bytes and advances the position.
    ///
    /// # Errors
    ///
    /// Returns a decode error if there are not enough bytes remaining.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .ok_or_else(|| Error::decode(self.absolute_position(), "position overflow"))?;

        if end > self.data.len() {
            return Err(Error::decode(
                self.absolute_position(),
                format!(
                    "truncated: need {} bytes, {} remaining",
                    count,
                    self.remaining()
                ),
            ));
        }

        let result = &self.data[self.pos..end];
        self.pos = end;
        Ok(result)
    }

    /// Reads `len` bytes of Shift-JIS text.
    pub fn read_shift_jis(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        Ok(decode_shift_jis(bytes))
    }
}

/// Decodes Shift-JIS bytes, stopping at the first null byte.
pub fn decode_shift_jis(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let bytes = &bytes[..len];

    let (decoded, _, had_errors) = SHIFT_JIS.decode(bytes);
    if had_errors {
        debug!(
            "Shift-JIS decoding had errors for bytes: {:?}",
            &bytes[..bytes.len().min(20)]
        );
    }
    decoded.into_owned()
}

/// Encodes text as Shift-JIS (used when writing frames and fixtures).
pub fn encode_shift_jis(text: &str) -> Cow<'_, [u8]> {
    let (encoded, _, _) = SHIFT_JIS.encode(text);
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let data = [
            0x01, // u8
            0x02, 0x00, // u16
            0x03, 0x00, 0x00, 0x00, // u32
            0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // i64: -1
        ];
        let mut buf = ByteBuffer::new(&data);

        assert_eq!(buf.read_u8().unwrap(), 1);
        assert_eq!(buf.read_u16().unwrap(), 2);
        assert_eq!(buf.read_u32().unwrap(), 3);
        assert_eq!(buf.read_i64().unwrap(), -1);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_truncation_reports_absolute_position() {
        let data = [0x01, 0x02];
        let mut buf = ByteBuffer::with_origin(&data, 100);
        buf.skip(1).unwrap();

        match buf.read_u32() {
            Err(Error::Decode { position, .. }) => assert_eq!(position, 101),
            other => panic!("expected decode error, got {:?}", other),
        }
        // failed read does not advance
        assert_eq!(buf.position(), 1);
    }

    #[test]
    fn test_decode_shift_jis() {
        // "テスト" in Shift-JIS
        let data = [0x83, 0x65, 0x83, 0x58, 0x83, 0x67, 0x00];
        assert_eq!(decode_shift_jis(&data), "テスト");
    }

    #[test]
    fn test_shift_jis_round_trip_through_buffer() {
        let encoded = encode_shift_jis("ゴブリン");
        let mut buf = ByteBuffer::new(&encoded);
        assert_eq!(buf.read_shift_jis(encoded.len()).unwrap(), "ゴブリン");
    }
}
