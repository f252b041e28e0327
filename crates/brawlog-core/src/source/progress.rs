use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    #[default]
    Running,
    Completed,
    Failed,
}

/// Snapshot of a reader's progress.
///
/// `total` is `None` for open-ended live sources. Once known it only grows,
/// and once the state is terminal the value is frozen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressStatus {
    pub processed: u64,
    pub total: Option<u64>,
    /// Frames dropped by a live reader.
    pub skipped: u64,
    /// Entries of unknown kind passed over by an import reader.
    pub warnings: u64,
    pub state: ProgressState,
}

impl ProgressStatus {
    pub fn open_ended() -> Self {
        Self::default()
    }

    pub fn with_total(total: u64) -> Self {
        Self {
            total: Some(total),
            ..Self::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state != ProgressState::Running
    }

    pub fn record_processed(&mut self) {
        if !self.is_terminal() {
            self.processed += 1;
        }
    }

    pub fn record_skipped(&mut self) {
        if !self.is_terminal() {
            self.skipped += 1;
        }
    }

    pub fn record_warning(&mut self) {
        if !self.is_terminal() {
            self.warnings += 1;
        }
    }

    /// Set the terminal state. The first terminal state wins.
    pub fn finish(&mut self, state: ProgressState) {
        if !self.is_terminal() {
            self.state = state;
        }
    }
}

/// Cooperative cancellation flag shared between a reader and its controller.
///
/// Cloning shares the flag; cancelling is idempotent and may happen from any
/// thread while the reader is decoding.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_state_is_frozen() {
        let mut status = ProgressStatus::with_total(3);
        status.record_processed();
        status.finish(ProgressState::Failed);
        status.finish(ProgressState::Completed);
        status.record_processed();

        assert_eq!(status.state, ProgressState::Failed);
        assert_eq!(status.processed, 1);
    }

    #[test]
    fn test_cancel_token_shared_and_idempotent() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());

        other.cancel();
        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }
}
