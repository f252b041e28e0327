//! Live frame codec.
//!
//! ```text
//! Offset  Size  Field
//! ──────────────────────────────────────────
//! 0       2     magic (0x4B42, little-endian)
//! 2       2     payload length
//! 4       8     timestamp (unix ms, little-endian)
//! 12      N     payload (Shift-JIS chat line)
//! 12+N    1     xor of payload bytes
//! ```

use chrono::{DateTime, Utc};

use crate::config::frame::{CHECKSUM_LEN, HEADER_LEN, MAGIC, MAX_PAYLOAD_LEN};
use crate::process::{ByteBuffer, decode_shift_jis, encode_shift_jis};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    Frame(Frame),
    /// Bytes that could not be framed; `position` is their stream offset.
    Corrupt { position: u64, reason: String },
}

/// Encode a chat line as a frame.
pub fn encode_frame(timestamp: DateTime<Utc>, line: &str) -> Vec<u8> {
    let payload = encode_shift_jis(line);
    let len = payload.len().min(MAX_PAYLOAD_LEN);
    let payload = &payload[..len];

    let mut frame = Vec::with_capacity(HEADER_LEN + len + CHECKSUM_LEN);
    frame.extend_from_slice(&MAGIC.to_le_bytes());
    frame.extend_from_slice(&(len as u16).to_le_bytes());
    frame.extend_from_slice(&timestamp.timestamp_millis().to_le_bytes());
    frame.extend_from_slice(payload);
    frame.push(checksum(payload));
    frame
}

fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, b| acc ^ b)
}

/// Incremental frame decoder.
///
/// Bytes are pushed as they arrive; partial frames stay buffered until the
/// rest shows up. After a bad header or checksum the decoder scans forward
/// from just past the magic for the next frame and reports the discarded
/// run once.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Stream offset of `buffer[0]`.
    offset: u64,
    resyncing: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_event(&mut self) -> Option<FrameEvent> {
        loop {
            if self.buffer.len() < 2 {
                return None;
            }

            if u16::from_le_bytes([self.buffer[0], self.buffer[1]]) != MAGIC {
                let position = self.offset;
                let skip = find_magic(&self.buffer[1..])
                    .map(|i| i + 1)
                    .unwrap_or(self.buffer.len() - 1);
                self.consume(skip);
                if self.resyncing {
                    continue;
                }
                self.resyncing = true;
                return Some(FrameEvent::Corrupt {
                    position,
                    reason: "bad frame magic".to_string(),
                });
            }

            if self.buffer.len() < HEADER_LEN {
                return None;
            }

            let position = self.offset;
            let mut header = ByteBuffer::with_origin(&self.buffer[..HEADER_LEN], position);
            // Header slice is exactly HEADER_LEN bytes, so these reads succeed.
            let (len, millis) = match (header.skip(2), header.read_u16(), header.read_i64()) {
                (Ok(()), Ok(len), Ok(millis)) => (len as usize, millis),
                _ => return None,
            };

            if len > MAX_PAYLOAD_LEN {
                self.consume(2);
                self.resyncing = true;
                return Some(FrameEvent::Corrupt {
                    position,
                    reason: format!("declared payload length {} exceeds {}", len, MAX_PAYLOAD_LEN),
                });
            }

            let total = HEADER_LEN + len + CHECKSUM_LEN;
            if self.buffer.len() < total {
                return None;
            }

            let payload = &self.buffer[HEADER_LEN..HEADER_LEN + len];
            let expected = self.buffer[HEADER_LEN + len];
            let actual = checksum(payload);

            if expected != actual {
                // The declared length may be the corrupt part, so only the
                // magic is dropped and the scan looks for the next frame.
                self.consume(2);
                self.resyncing = true;
                return Some(FrameEvent::Corrupt {
                    position,
                    reason: format!(
                        "checksum mismatch: expected {:#04x}, computed {:#04x}",
                        expected, actual
                    ),
                });
            }

            self.resyncing = false;
            let line = decode_shift_jis(payload);
            self.consume(total);
            return Some(match DateTime::from_timestamp_millis(millis) {
                Some(timestamp) => FrameEvent::Frame(Frame { timestamp, line }),
                None => FrameEvent::Corrupt {
                    position,
                    reason: format!("timestamp out of range: {}", millis),
                },
            });
        }
    }

    fn consume(&mut self, count: usize) {
        self.buffer.drain(..count);
        self.offset += count as u64;
    }
}

fn find_magic(bytes: &[u8]) -> Option<usize> {
    let magic = MAGIC.to_le_bytes();
    bytes.windows(2).position(|w| w == magic)
}
