#![cfg_attr(not(target_os = "windows"), allow(dead_code))]

use crate::error::{Error, Result};

#[cfg(target_os = "windows")]
use tracing::{debug, warn};

#[cfg(target_os = "windows")]
use std::ffi::OsString;
#[cfg(target_os = "windows")]
use std::os::windows::ffi::OsStringExt;
#[cfg(target_os = "windows")]
use windows::Win32::Foundation::{CloseHandle, HANDLE};
#[cfg(target_os = "windows")]
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPPROCESS,
};
#[cfg(target_os = "windows")]
use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ};

/// Open handle to the game client process.
#[cfg(target_os = "windows")]
pub struct ProcessHandle {
    handle: HANDLE,
    pub pid: u32,
}

#[cfg(not(target_os = "windows"))]
pub struct ProcessHandle {
    pub pid: u32,
}

// The raw handle is only used through ReadProcessMemory, which is thread-safe.
#[cfg(target_os = "windows")]
unsafe impl Send for ProcessHandle {}

#[cfg(target_os = "windows")]
impl ProcessHandle {
    pub fn find_and_open(name: &str) -> Result<Self> {
        let pid = find_process_id(name)?;
        debug!("Found {} with PID {}", name, pid);
        Self::open(pid)
    }

    pub fn open(pid: u32) -> Result<Self> {
        // SAFETY: OpenProcess takes plain flags and a pid; the returned handle is owned
        // by this struct and closed in Drop.
        let handle = unsafe {
            OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid)
                .map_err(|e| Error::ProcessOpenFailed(format!("PID {}: {}", pid, e)))?
        };

        Ok(Self { handle, pid })
    }

    pub fn handle(&self) -> HANDLE {
        self.handle
    }
}

#[cfg(not(target_os = "windows"))]
impl ProcessHandle {
    pub fn find_and_open(name: &str) -> Result<Self> {
        Err(Error::ProcessNotFound(format!(
            "{}: process access is only supported on Windows",
            name
        )))
    }

    pub fn open(pid: u32) -> Result<Self> {
        Err(Error::ProcessNotFound(format!(
            "PID {}: process access is only supported on Windows",
            pid
        )))
    }
}

#[cfg(target_os = "windows")]
impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.handle.is_invalid() {
            // SAFETY: self.handle came from OpenProcess and is closed exactly once here.
            if let Err(e) = unsafe { CloseHandle(self.handle) } {
                warn!("Failed to close process handle: {}", e);
            }
        }
    }
}

#[cfg(target_os = "windows")]
fn find_process_id(name: &str) -> Result<u32> {
    // SAFETY: CreateToolhelp32Snapshot has no preconditions; the snapshot is closed below.
    let snapshot = unsafe {
        CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
            .map_err(|e| Error::ProcessNotFound(e.to_string()))?
    };

    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    let mut found = None;
    // SAFETY: snapshot is valid and entry.dwSize is initialised as the API requires.
    unsafe {
        if Process32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                let len = entry
                    .szExeFile
                    .iter()
                    .position(|&c| c == 0)
                    .unwrap_or(entry.szExeFile.len());
                let exe_name = OsString::from_wide(&entry.szExeFile[..len]);

                if exe_name.to_string_lossy().eq_ignore_ascii_case(name) {
                    found = Some(entry.th32ProcessID);
                    break;
                }

                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }
        let _ = CloseHandle(snapshot);
    }

    found.ok_or_else(|| Error::ProcessNotFound(format!("Process '{}' not found", name)))
}
