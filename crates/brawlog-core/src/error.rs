use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::record::Provenance;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Decode error at {position}: {message}")]
    Decode { position: u64, message: String },

    #[error("Out of order record for {provenance}: expected sequence {expected}, got {actual}")]
    OutOfOrder {
        provenance: Provenance,
        expected: u64,
        actual: u64,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Config parse error: {0}")]
    ConfigParseError(String),

    #[error("Invalid progress: {0}")]
    InvalidProgress(String),

    #[error("Another operation is already running")]
    MonitorBusy,

    #[error("No database is open")]
    NoDatabaseOpen,

    #[error("Input and output refer to the same file: {0}")]
    SameInputOutput(PathBuf),

    #[error("No capture source recorded for the open store")]
    MissingSource,

    #[error("Cannot continue from {0}: not a live source")]
    NotLiveSource(String),

    #[error("Monitor worker is no longer running")]
    WorkerGone,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used for rollback decisions and status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Decode,
    OutOfOrder,
    Persistence,
    Cancelled,
    Other,
}

impl Error {
    pub fn decode(position: u64, message: impl Into<String>) -> Self {
        Error::Decode {
            position,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decode { .. } | Error::EncodingError(_) => ErrorKind::Decode,
            Error::OutOfOrder { .. } => ErrorKind::OutOfOrder,
            Error::Persistence(_) | Error::Io(_) | Error::Json(_) => ErrorKind::Persistence,
            Error::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            Error::ProcessNotFound(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::decode(3, "bad").kind(), ErrorKind::Decode);
        assert_eq!(
            Error::OutOfOrder {
                provenance: Provenance::Live,
                expected: 2,
                actual: 4
            }
            .kind(),
            ErrorKind::OutOfOrder
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(Error::from(io).kind(), ErrorKind::Persistence);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(Error::MonitorBusy.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(Error::from(io).is_not_found());
        assert!(!Error::Cancelled.is_not_found());
    }
}
