//! The monitor's worker thread.
//!
//! Commands are taken one at a time while idle. While an operation runs the
//! queue is drained between reads, so a record is never applied while a
//! command is being handled.

use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};

use chrono::FixedOffset;
use tracing::{debug, error, info, warn};

use super::{
    Command, FailureDetail, MonitorOptions, MonitorState, OperationMode, Reply, Shared,
    StatusEvent, StatusTrigger,
};
use crate::dispatch::ResetReason;
use crate::error::{Error, Result};
use crate::record::Provenance;
use crate::source::{
    CancelToken, ImportSourceType, ReadOutcome, ReaderOptions, SourceDescriptor, SourceKind,
    SourceReader, open_reader,
};
use crate::store::{Store, StoreSnapshot};

/// One run of the ingestion loop.
struct Operation {
    mode: OperationMode,
    reader: Box<dyn SourceReader>,
    cancel: CancelToken,
    /// Store state to return to if the run fails.
    revert_to: StoreSnapshot,
    reopen: Option<PathBuf>,
    processed: u64,
    stopping: bool,
    shutdown: bool,
    stop_waiters: Vec<Reply<()>>,
}

impl Operation {
    fn new(
        mode: OperationMode,
        reader: Box<dyn SourceReader>,
        cancel: CancelToken,
        revert_to: StoreSnapshot,
        reopen: Option<PathBuf>,
    ) -> Self {
        Self {
            mode,
            reader,
            cancel,
            revert_to,
            reopen,
            processed: 0,
            stopping: false,
            shutdown: false,
            stop_waiters: Vec::new(),
        }
    }

    fn event(&self, trigger: StatusTrigger) -> StatusEvent {
        StatusEvent::from_progress(self.mode, trigger, self.processed, &self.reader.progress())
    }
}

pub(super) struct Worker {
    store: Store,
    commands: Receiver<Command>,
    shared: Arc<Shared>,
    options: MonitorOptions,
}

impl Worker {
    pub(super) fn new(
        store: Store,
        commands: Receiver<Command>,
        shared: Arc<Shared>,
        options: MonitorOptions,
    ) -> Self {
        Self {
            store,
            commands,
            shared,
            options,
        }
    }

    pub(super) fn run(mut self) {
        debug!("Monitor worker started");
        while let Ok(command) = self.commands.recv() {
            if self.handle_idle(command).is_break() {
                break;
            }
        }
        debug!("Monitor worker exiting");
    }

    fn handle_idle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Start {
                source,
                output,
                reply,
            } => match self.begin_capture(source, output) {
                Ok(op) => return self.launch_capture(op, reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::Continue { source, reply } => match self.begin_continue(source) {
                Ok(op) => return self.launch_capture(op, reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::Rebuild {
                mode,
                input,
                output,
                format,
                upgrade,
                reply,
            } => match self.begin_rebuild(mode, &input, &output, format, upgrade) {
                Ok(op) => {
                    self.launch(&op, reply);
                    return self.run_rebuild(op, &output);
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::Stop { reply } => {
                let _ = reply.send(Ok(()));
            }
            Command::OpenDatabase { path, reply } => {
                let _ = reply.send(self.open_database(&path));
            }
            Command::PurgeChatInfo { reply } => {
                let _ = reply.send(self.store.purge_chat_info());
            }
            Command::Shutdown => return ControlFlow::Break(()),
            other => self.handle_shared(other),
        }
        ControlFlow::Continue(())
    }

    /// Commands that are safe both while idle and while running.
    fn handle_shared(&mut self, command: Command) {
        match command {
            Command::Subscribe { observer, reply } => {
                let id = self.store.subscribe(observer);
                debug!("Subscribed observer {:?}", id);
                let _ = reply.send(Ok(id));
            }
            Command::Unsubscribe { id, reply } => {
                let _ = reply.send(Ok(self.store.unsubscribe(id)));
            }
            Command::Query(query) => {
                let store = &self.store;
                if panic::catch_unwind(AssertUnwindSafe(|| query(store))).is_err() {
                    error!("Store query panicked");
                }
            }
            _ => {}
        }
    }

    fn handle_busy(&mut self, command: Command, op: &mut Operation) {
        match command {
            Command::Start { reply, .. }
            | Command::Continue { reply, .. }
            | Command::Rebuild { reply, .. }
            | Command::OpenDatabase { reply, .. } => {
                debug!("Refusing command while {} is running", op.mode);
                let _ = reply.send(Err(Error::MonitorBusy));
            }
            Command::PurgeChatInfo { reply } => {
                let _ = reply.send(Err(Error::MonitorBusy));
            }
            Command::Stop { reply } => {
                op.stop_waiters.push(reply);
                self.request_stop(op);
            }
            Command::Shutdown => {
                op.shutdown = true;
                self.request_stop(op);
            }
            other => self.handle_shared(other),
        }
    }

    fn poll_commands(&mut self, op: &mut Operation) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.handle_busy(command, op),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    op.shutdown = true;
                    self.request_stop(op);
                    return;
                }
            }
        }
    }

    /// Captures end at the next record boundary; rebuilds are cancelled.
    fn request_stop(&self, op: &mut Operation) {
        if op.stopping {
            return;
        }
        info!("Stopping {}", op.mode);
        op.stopping = true;
        self.shared.set_state(MonitorState::Stopping);
        self.shared.broadcast(&StatusEvent {
            stopping: true,
            ..op.event(StatusTrigger::Transition)
        });
        if op.mode.rebuilds() {
            op.cancel.cancel();
        }
    }

    fn reader_options(
        &self,
        cancel: CancelToken,
        resume_after: u64,
        timestamp_upgrade: Option<FixedOffset>,
    ) -> ReaderOptions {
        ReaderOptions {
            cancel,
            poll_interval: self.options.poll_interval,
            resume_after,
            timestamp_upgrade,
        }
    }

    fn open_database(&mut self, path: &Path) -> Result<()> {
        let opened = Store::open(path)?;
        self.store.swap_content(opened, ResetReason::Opened);
        Ok(())
    }

    fn begin_capture(
        &mut self,
        source: SourceDescriptor,
        output: Option<PathBuf>,
    ) -> Result<Operation> {
        if let Some(output) = &output {
            let clobbers = [self.store.path(), source.path()]
                .into_iter()
                .flatten()
                .any(|existing| same_file(existing, output));
            if clobbers {
                return Err(Error::SameInputOutput(output.clone()));
            }
        }

        let cancel = CancelToken::new();
        let reader = open_reader(&source, &self.reader_options(cancel.clone(), 0, None))?;
        let revert_to = self.store.snapshot();
        let reopen = self.store.path().map(Path::to_path_buf);

        let store = match output {
            Some(path) => Store::create(path, Some(source))?,
            None => Store::in_memory(),
        };
        self.store.swap_content(store, ResetReason::Opened);

        Ok(Operation::new(
            OperationMode::Capture,
            reader,
            cancel,
            revert_to,
            reopen,
        ))
    }

    fn begin_continue(&mut self, source: Option<SourceDescriptor>) -> Result<Operation> {
        if !self.store.is_open() {
            return Err(Error::NoDatabaseOpen);
        }
        let source = match source {
            Some(source) => source,
            None => self.store.origin().cloned().ok_or(Error::MissingSource)?,
        };
        if source.kind() != SourceKind::Live {
            return Err(Error::NotLiveSource(source.to_string()));
        }

        let resume_after = self.store.last_sequence(Provenance::Live);
        let cancel = CancelToken::new();
        let reader = open_reader(
            &source,
            &self.reader_options(cancel.clone(), resume_after, None),
        )?;

        Ok(Operation::new(
            OperationMode::Continue,
            reader,
            cancel,
            self.store.snapshot(),
            self.store.path().map(Path::to_path_buf),
        ))
    }

    fn begin_rebuild(
        &mut self,
        mode: OperationMode,
        input: &Path,
        output: &Path,
        format: ImportSourceType,
        upgrade: Option<FixedOffset>,
    ) -> Result<Operation> {
        if same_file(input, output) {
            return Err(Error::SameInputOutput(output.to_path_buf()));
        }

        let descriptor = match format {
            ImportSourceType::Native => SourceDescriptor::Store {
                path: input.to_path_buf(),
            },
            format => SourceDescriptor::Foreign {
                path: input.to_path_buf(),
                format,
            },
        };
        let cancel = CancelToken::new();
        let reader = open_reader(&descriptor, &self.reader_options(cancel.clone(), 0, upgrade))?;

        let reopen = match mode {
            OperationMode::Reparse => Some(input.to_path_buf()),
            _ => self.store.path().map(Path::to_path_buf),
        };
        Ok(Operation::new(
            mode,
            reader,
            cancel,
            self.store.snapshot(),
            reopen,
        ))
    }

    fn launch(&self, op: &Operation, reply: Reply<()>) {
        info!("Starting {}", op.mode);
        self.shared.install_cancel(Some(op.cancel.clone()));
        self.shared.set_state(MonitorState::Running(op.mode));
        let _ = reply.send(Ok(()));
        self.shared.broadcast(&op.event(StatusTrigger::Transition));
    }

    fn launch_capture(&mut self, mut op: Operation, reply: Reply<()>) -> ControlFlow<()> {
        self.launch(&op, reply);
        let result = self.ingest(&mut op);
        self.finish(op, result)
    }

    /// Apply records one at a time to the active store.
    fn ingest(&mut self, op: &mut Operation) -> Result<()> {
        loop {
            self.poll_commands(op);
            if op.stopping {
                return Ok(());
            }

            match op.reader.next()? {
                ReadOutcome::Record(record) => {
                    self.store.apply(record)?;
                    op.processed += 1;
                    self.shared.broadcast(&op.event(StatusTrigger::Record));
                }
                ReadOutcome::Idle => {}
                ReadOutcome::EndOfStream => return Ok(()),
            }
        }
    }

    fn run_rebuild(&mut self, mut op: Operation, output: &Path) -> ControlFlow<()> {
        match self.rebuild_into(&mut op, output) {
            Ok(rebuilt) => {
                self.store.swap_content(rebuilt, ResetReason::Swapped);
                self.finish(op, Ok(()))
            }
            Err(e) => self.finish(op, Err(e)),
        }
    }

    /// Build a fresh store from the operation's reader and save it to
    /// `output`. The active store is not touched.
    fn rebuild_into(&mut self, op: &mut Operation, output: &Path) -> Result<Store> {
        let mut rebuilt = Store::in_memory();
        {
            let mut bulk = rebuilt.begin_bulk();
            loop {
                self.poll_commands(op);
                match op.reader.next()? {
                    ReadOutcome::Record(record) => {
                        bulk.apply(record)?;
                        op.processed += 1;
                        self.shared.broadcast(&op.event(StatusTrigger::Record));
                    }
                    ReadOutcome::Idle => {}
                    ReadOutcome::EndOfStream => break,
                }
            }
            bulk.commit()?;
        }

        let shared = &self.shared;
        let saving = op.event(StatusTrigger::Saving);
        rebuilt.save_as(output, |written, total| {
            if total > 0 {
                shared.broadcast(&StatusEvent {
                    processed_items: written,
                    total_items: Some(total),
                    ..saving.clone()
                });
            }
        })?;
        info!("Saved {} records to {}", rebuilt.len(), output.display());
        Ok(rebuilt)
    }

    fn finish(&mut self, op: Operation, result: Result<()>) -> ControlFlow<()> {
        let mut event = op.event(StatusTrigger::Transition);
        match result {
            Ok(()) => {
                info!("{} completed after {} records", op.mode, op.processed);
                event.completed = true;
            }
            Err(error) => {
                if error.is_cancelled() {
                    warn!("{} cancelled after {} records", op.mode, op.processed);
                } else {
                    error!("{} failed after {} records: {}", op.mode, op.processed, error);
                }
                if let Err(e) = self.store.restore(op.revert_to) {
                    error!("Rollback failed: {}", e);
                }
                event.failed = true;
                event.failure = Some(FailureDetail {
                    kind: error.kind(),
                    message: error.to_string(),
                    reopen: op.reopen,
                });
            }
        }

        self.shared.install_cancel(None);
        self.shared.set_state(MonitorState::Idle);
        self.shared.broadcast(&event);
        for waiter in op.stop_waiters {
            let _ = waiter.send(Ok(()));
        }

        if op.shutdown {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

/// Whether two paths name the same file, whether or not it exists yet.
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => match (std::path::absolute(a), std::path::absolute(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_file_resolves_relative_segments() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fight.blog");
        std::fs::write(&file, "x").unwrap();

        let dotted = dir.path().join(".").join("fight.blog");
        assert!(same_file(&file, &dotted));
        assert!(!same_file(&file, &dir.path().join("other.blog")));
        assert!(same_file(
            &dir.path().join("new.blog"),
            &dir.path().join("new.blog")
        ));
    }
}
