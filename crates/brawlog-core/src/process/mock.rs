//! Mock memory reader for testing
//!
//! Provides an in-memory implementation of `ReadMemory`. The buffer is shared
//! between clones, so a test can keep one handle and keep writing chat ring
//! slots while a live reader polls another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::process::ReadMemory;
use crate::process::bytes::encode_shift_jis;

#[derive(Debug, Clone)]
pub struct MockMemoryReader {
    data: Arc<Mutex<Vec<u8>>>,
    base: u64,
    detached: Arc<AtomicBool>,
}

impl MockMemoryReader {
    /// Create a new mock reader with the given data at base address 0x1000
    pub fn new(data: Vec<u8>) -> Self {
        Self::with_base(data, 0x1000)
    }

    pub fn with_base(data: Vec<u8>, base: u64) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            base,
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Overwrite bytes at an absolute address, growing the buffer if needed.
    pub fn write_bytes(&self, address: u64, bytes: &[u8]) {
        let offset = address.saturating_sub(self.base) as usize;
        let mut data = self.lock();
        if data.len() < offset + bytes.len() {
            data.resize(offset + bytes.len(), 0);
        }
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn write_u32(&self, address: u64, value: u32) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    /// Make every subsequent read fail, as if the process had exited.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ReadMemory for MockMemoryReader {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        if self.detached.load(Ordering::SeqCst) {
            return Err(Error::MemoryReadFailed {
                address,
                message: "Process detached".to_string(),
            });
        }
        if address < self.base {
            return Err(Error::MemoryReadFailed {
                address,
                message: format!("Address below base (base=0x{:X})", self.base),
            });
        }
        let offset = (address - self.base) as usize;
        let data = self.lock();
        if offset + size > data.len() {
            return Err(Error::MemoryReadFailed {
                address,
                message: format!(
                    "Out of bounds: offset={}, size={}, len={}",
                    offset,
                    size,
                    data.len()
                ),
            });
        }
        Ok(data[offset..offset + size].to_vec())
    }
}

/// Builder for creating test memory images
#[derive(Debug, Clone, Default)]
pub struct MockMemoryBuilder {
    data: Vec<u8>,
    base: u64,
}

impl MockMemoryBuilder {
    /// Create a new builder with default base address (0x1000)
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            base: 0x1000,
        }
    }

    pub fn base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    /// Pre-allocate buffer with zeros up to the specified size
    pub fn with_size(mut self, size: usize) -> Self {
        self.data.resize(size, 0);
        self
    }

    /// Write an unsigned 16-bit integer at the specified offset from base
    pub fn write_u16(mut self, offset: usize, value: u16) -> Self {
        self.ensure_size(offset + 2);
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        self
    }

    /// Write an unsigned 32-bit integer at the specified offset from base
    pub fn write_u32(mut self, offset: usize, value: u32) -> Self {
        self.ensure_size(offset + 4);
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        self
    }

    /// Write raw bytes at the specified offset from base
    pub fn write_bytes(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.ensure_size(offset + bytes.len());
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Write a null-terminated Shift-JIS string at the specified offset
    pub fn write_shift_jis(mut self, offset: usize, text: &str) -> Self {
        let bytes = encode_shift_jis(text).into_owned();
        self.ensure_size(offset + bytes.len() + 1);
        self.data[offset..offset + bytes.len()].copy_from_slice(&bytes);
        self.data[offset + bytes.len()] = 0;
        self
    }

    pub fn build(self) -> MockMemoryReader {
        MockMemoryReader::with_base(self.data, self.base)
    }

    fn ensure_size(&mut self, required: usize) {
        if self.data.len() < required {
            self.data.resize(required, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_reader_with_base() {
        let reader = MockMemoryReader::with_base(vec![0x01, 0x02, 0x03, 0x04], 0x140000000);
        let bytes = reader.read_bytes(0x140000000, 4).unwrap();
        assert_eq!(bytes, vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_mock_reader_out_of_bounds() {
        let reader = MockMemoryReader::new(vec![0x01, 0x02]);
        assert!(reader.read_u32(0x1000).is_err());
    }

    #[test]
    fn test_mock_reader_below_base() {
        let reader = MockMemoryReader::with_base(vec![0; 4], 0x2000);
        assert!(reader.read_bytes(0x1000, 4).is_err());
    }

    #[test]
    fn test_clones_share_writes() {
        let reader = MockMemoryBuilder::new().with_size(8).build();
        let writer = reader.clone();

        writer.write_u32(0x1004, 77);
        assert_eq!(reader.read_u32(0x1004).unwrap(), 77);

        writer.write_bytes(0x1010, &[0xAA]);
        assert_eq!(reader.len(), 0x11);
    }

    #[test]
    fn test_detach_fails_reads() {
        let reader = MockMemoryBuilder::new().write_u32(0, 1).build();
        reader.clone().detach();
        assert!(reader.read_u32(0x1000).is_err());
    }

    #[test]
    fn test_builder_shift_jis() {
        let reader = MockMemoryBuilder::new()
            .with_size(16)
            .write_shift_jis(0, "テスト")
            .write_u16(12, 0x4B42)
            .build();

        let bytes = reader.read_bytes(0x1000, 7).unwrap();
        assert_eq!(bytes, vec![0x83, 0x65, 0x83, 0x58, 0x83, 0x67, 0x00]);
        assert_eq!(reader.read_u16(0x100C).unwrap(), 0x4B42);
    }
}
