use std::path::PathBuf;

use serde::Serialize;
use strum::Display;

use crate::error::{Error, ErrorKind, Result};
use crate::source::ProgressStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "lowercase")]
pub enum OperationMode {
    Capture,
    Continue,
    Import,
    Reparse,
}

impl OperationMode {
    /// Whether the operation builds a fresh store and swaps it in.
    pub fn rebuilds(&self) -> bool {
        matches!(self, OperationMode::Import | OperationMode::Reparse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "lowercase")]
pub enum StatusTrigger {
    /// The operation started, began stopping, or reached a terminal state.
    Transition,
    /// A record was applied.
    Record,
    /// The finished store is being written; counts refer to records saved.
    Saving,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub kind: ErrorKind,
    pub message: String,
    /// Store file the caller should reopen: the reparse input, otherwise the
    /// store that was already open.
    pub reopen: Option<PathBuf>,
}

/// Immutable progress snapshot broadcast by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub operation: OperationMode,
    pub trigger: StatusTrigger,
    pub processed_items: u64,
    pub total_items: Option<u64>,
    pub skipped_items: u64,
    pub warnings: u64,
    /// A stop was requested and the operation is winding down.
    pub stopping: bool,
    pub completed: bool,
    pub failed: bool,
    pub failure: Option<FailureDetail>,
}

impl StatusEvent {
    pub(crate) fn from_progress(
        operation: OperationMode,
        trigger: StatusTrigger,
        processed: u64,
        progress: &ProgressStatus,
    ) -> Self {
        Self {
            operation,
            trigger,
            processed_items: processed,
            total_items: progress.total,
            skipped_items: progress.skipped,
            warnings: progress.warnings,
            stopping: false,
            completed: false,
            failed: false,
            failure: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.completed || self.failed
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure
            .as_ref()
            .is_some_and(|f| f.kind == ErrorKind::Cancelled)
    }

    /// `(processed, total)` for rendering a bounded progress indicator.
    ///
    /// Rejects events without a usable total: a missing or zero total, or a
    /// processed count beyond it.
    pub fn progress(&self) -> Result<(u64, u64)> {
        let total = match self.total_items {
            Some(total) if total >= 1 => total,
            Some(total) => {
                return Err(Error::InvalidProgress(format!(
                    "total must be at least 1, got {}",
                    total
                )));
            }
            None => return Err(Error::InvalidProgress("total is unknown".to_string())),
        };
        if self.processed_items > total {
            return Err(Error::InvalidProgress(format!(
                "processed {} exceeds total {}",
                self.processed_items, total
            )));
        }
        Ok((self.processed_items, total))
    }
}
