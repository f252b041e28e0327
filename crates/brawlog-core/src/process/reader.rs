#![cfg_attr(not(target_os = "windows"), allow(dead_code, unused_variables))]

use crate::error::{Error, Result};
use crate::process::ProcessHandle;

#[cfg(target_os = "windows")]
use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;

/// Trait for reading memory from a process or buffer
///
/// This trait enables mocking for tests and abstracts over different memory sources.
pub trait ReadMemory {
    /// Read raw bytes from memory at the given address
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Read an unsigned 16-bit integer from memory
    fn read_u16(&self, address: u64) -> Result<u16> {
        let bytes = self.read_bytes(address, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read an unsigned 32-bit integer from memory
    fn read_u32(&self, address: u64) -> Result<u32> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Memory reader bound to an open game process.
pub struct MemoryReader {
    process: ProcessHandle,
}

impl MemoryReader {
    pub fn new(process: ProcessHandle) -> Self {
        Self { process }
    }

    #[cfg(target_os = "windows")]
    fn read_bytes_impl(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; size];
        let mut bytes_read = 0;

        // SAFETY: ReadProcessMemory is called with a handle opened with PROCESS_VM_READ,
        // a buffer of exactly `size` bytes and a valid out-pointer for the byte count.
        // An invalid address makes the call fail, which is mapped into Result.
        unsafe {
            ReadProcessMemory(
                self.process.handle(),
                address as *const _,
                buffer.as_mut_ptr() as *mut _,
                size,
                Some(&mut bytes_read),
            )
            .map_err(|e| Error::MemoryReadFailed {
                address,
                message: e.to_string(),
            })?;
        }

        // A slot read halfway through a write is useless, so partial reads fail.
        if bytes_read != size {
            return Err(Error::MemoryReadFailed {
                address,
                message: format!("Expected {} bytes, read {}", size, bytes_read),
            });
        }

        Ok(buffer)
    }

    #[cfg(not(target_os = "windows"))]
    fn read_bytes_impl(&self, address: u64, _size: usize) -> Result<Vec<u8>> {
        Err(Error::MemoryReadFailed {
            address,
            message: "Windows only: memory reading not supported on this platform".to_string(),
        })
    }
}

impl ReadMemory for MemoryReader {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.read_bytes_impl(address, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::MockMemoryReader;

    #[test]
    fn test_read_u16() {
        let reader = MockMemoryReader::new(vec![0x42, 0x4B]);
        assert_eq!(reader.read_u16(0x1000).unwrap(), 0x4B42);
    }

    #[test]
    fn test_read_u32() {
        let reader = MockMemoryReader::new(vec![0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(reader.read_u32(0x1000).unwrap(), 0xFFFFFFFF);
    }

    #[test]
    fn test_read_out_of_range() {
        let reader = MockMemoryReader::new(vec![0x01]);
        assert!(reader.read_u32(0x1000).is_err());
    }
}
