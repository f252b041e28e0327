//! The monitor: lifecycle control over ingestion operations.
//!
//! A `Monitor` owns a worker thread which in turn owns the active store and
//! the running operation. Every call on the handle becomes a command on one
//! channel and is handled by the worker between records, so nothing outside
//! the worker ever touches the store concurrently with an apply.
//!
//! ```text
//!            start / continue / import / reparse
//!   Idle ───────────────────────────────────────▶ Running(mode)
//!    ▲                                               │  stop
//!    │      end of stream / failure (rolled back)    ▼
//!    └──────────────────────────────────────────── Stopping
//! ```
//!
//! Cancellation does not go through the channel: it flips the running
//! operation's `CancelToken`, which the reader checks between records.

mod status;
mod worker;

pub use status::{FailureDetail, OperationMode, StatusEvent, StatusTrigger};

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::FixedOffset;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::debug::ScanReport;
use crate::dispatch::{ObserverId, StoreObserver};
use crate::error::{Error, Result};
use crate::source::{CancelToken, ImportSourceType, SourceDescriptor};
use crate::store::Store;
use worker::Worker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    #[default]
    Idle,
    Running(OperationMode),
    Stopping,
}

/// Settings the worker applies to every operation.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub poll_interval: Duration,
    /// Offset used by timestamp upgrades when the caller gives none.
    pub upgrade_offset: Option<FixedOffset>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for MonitorOptions {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.capture.poll_interval(),
            upgrade_offset: config
                .import
                .upgrade_utc_offset_minutes
                .and_then(|minutes| FixedOffset::east_opt(minutes * 60)),
        }
    }
}

type Reply<T> = Sender<Result<T>>;
type StoreQuery = Box<dyn FnOnce(&Store) + Send>;

pub(crate) enum Command {
    Start {
        source: SourceDescriptor,
        output: Option<PathBuf>,
        reply: Reply<()>,
    },
    Continue {
        source: Option<SourceDescriptor>,
        reply: Reply<()>,
    },
    Rebuild {
        mode: OperationMode,
        input: PathBuf,
        output: PathBuf,
        format: ImportSourceType,
        upgrade: Option<FixedOffset>,
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    Subscribe {
        observer: Box<dyn StoreObserver>,
        reply: Reply<ObserverId>,
    },
    Unsubscribe {
        id: ObserverId,
        reply: Reply<bool>,
    },
    OpenDatabase {
        path: PathBuf,
        reply: Reply<()>,
    },
    PurgeChatInfo {
        reply: Reply<usize>,
    },
    Query(StoreQuery),
    Shutdown,
}

/// State shared between the handle and the worker.
#[derive(Default)]
pub(crate) struct Shared {
    state: Mutex<MonitorState>,
    cancel: Mutex<Option<CancelToken>>,
    listeners: Mutex<Vec<Sender<StatusEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    fn state(&self) -> MonitorState {
        *lock(&self.state)
    }

    fn set_state(&self, state: MonitorState) {
        debug!("Monitor state -> {:?}", state);
        *lock(&self.state) = state;
    }

    fn install_cancel(&self, token: Option<CancelToken>) {
        *lock(&self.cancel) = token;
    }

    fn cancel(&self) -> bool {
        match lock(&self.cancel).as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn broadcast(&self, event: &StatusEvent) {
        lock(&self.listeners).retain(|listener| listener.send(event.clone()).is_ok());
    }
}

/// Cloneable handle for interrupting the monitor from another thread,
/// e.g. a Ctrl+C handler.
#[derive(Clone)]
pub struct MonitorInterrupt {
    shared: Arc<Shared>,
    commands: Sender<Command>,
}

impl MonitorInterrupt {
    /// Cancel the running operation, if any.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    /// Ask the running operation to stop without waiting for it.
    pub fn stop(&self) {
        let (reply, _) = mpsc::channel();
        let _ = self.commands.send(Command::Stop { reply });
    }
}

pub struct Monitor {
    commands: Sender<Command>,
    shared: Arc<Shared>,
    options: MonitorOptions,
    worker: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Spawn a monitor over an empty in-memory store.
    pub fn new(options: MonitorOptions) -> Result<Self> {
        Self::spawn(Store::in_memory(), options)
    }

    /// Spawn a monitor whose worker takes ownership of `store`.
    pub fn spawn(store: Store, options: MonitorOptions) -> Result<Self> {
        let (commands, receiver) = mpsc::channel();
        let shared = Arc::new(Shared::default());

        let worker = Worker::new(store, receiver, Arc::clone(&shared), options.clone());
        let handle = thread::Builder::new()
            .name("brawlog-monitor".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            commands,
            shared,
            options,
            worker: Some(handle),
        })
    }

    fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = mpsc::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| Error::WorkerGone)?;
        response.recv().map_err(|_| Error::WorkerGone)?
    }

    pub fn state(&self) -> MonitorState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() != MonitorState::Idle
    }

    /// Receive every status event from now on.
    pub fn status_feed(&self) -> Receiver<StatusEvent> {
        let (sender, receiver) = mpsc::channel();
        lock(&self.shared.listeners).push(sender);
        receiver
    }

    pub fn interrupt_handle(&self) -> MonitorInterrupt {
        MonitorInterrupt {
            shared: Arc::clone(&self.shared),
            commands: self.commands.clone(),
        }
    }

    /// Begin a live capture into a new store at `output` (in memory if
    /// `None`). Returns once the source is open.
    pub fn start(&self, source: SourceDescriptor, output: Option<PathBuf>) -> Result<()> {
        self.request(|reply| Command::Start {
            source,
            output,
            reply,
        })
    }

    /// Resume capturing into the open store after its last live record.
    ///
    /// Without an explicit source, the store's recorded origin is used.
    pub fn continue_capture(&self, source: Option<SourceDescriptor>) -> Result<()> {
        self.request(|reply| Command::Continue { source, reply })
    }

    pub fn import(&self, input: &Path, output: &Path, format: ImportSourceType) -> Result<()> {
        self.rebuild(OperationMode::Import, input, output, format, None)
    }

    /// Import, reinterpreting naive timestamps as recorded in `offset`.
    ///
    /// Falls back to the configured offset, then to this machine's offset.
    pub fn upgrade_timestamp_import(
        &self,
        input: &Path,
        output: &Path,
        format: ImportSourceType,
        offset: Option<FixedOffset>,
    ) -> Result<()> {
        let offset = offset
            .or(self.options.upgrade_offset)
            .unwrap_or_else(|| *chrono::Local::now().offset());
        let mode = if format == ImportSourceType::Native {
            OperationMode::Reparse
        } else {
            OperationMode::Import
        };
        self.rebuild(mode, input, output, format, Some(offset))
    }

    /// Re-derive a store file with the current decoder.
    pub fn reparse(&self, input: &Path, output: &Path) -> Result<()> {
        self.rebuild(
            OperationMode::Reparse,
            input,
            output,
            ImportSourceType::Native,
            None,
        )
    }

    fn rebuild(
        &self,
        mode: OperationMode,
        input: &Path,
        output: &Path,
        format: ImportSourceType,
        upgrade: Option<FixedOffset>,
    ) -> Result<()> {
        self.request(|reply| Command::Rebuild {
            mode,
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            format,
            upgrade,
            reply,
        })
    }

    /// Stop the running operation and wait until the monitor is idle.
    pub fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply })
    }

    /// Cancel the running operation. Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    /// Probe a live source without touching any store.
    pub fn scan_source(&self, source: &SourceDescriptor) -> Result<ScanReport> {
        ScanReport::probe(source)
    }

    pub fn subscribe(&self, observer: Box<dyn StoreObserver>) -> Result<ObserverId> {
        self.request(|reply| Command::Subscribe { observer, reply })
    }

    pub fn unsubscribe(&self, id: ObserverId) -> Result<bool> {
        self.request(|reply| Command::Unsubscribe { id, reply })
    }

    pub fn open_database(&self, path: &Path) -> Result<()> {
        self.request(|reply| Command::OpenDatabase {
            path: path.to_path_buf(),
            reply,
        })
    }

    pub fn is_database_open(&self) -> Result<bool> {
        self.with_store(|store| store.is_open())
    }

    pub fn database_filename(&self) -> Result<Option<PathBuf>> {
        self.with_store(|store| store.path().map(Path::to_path_buf))
    }

    pub fn purge_chat_info(&self) -> Result<usize> {
        self.request(|reply| Command::PurgeChatInfo { reply })
    }

    /// Run a read-only query against the active store on the worker.
    pub fn with_store<T, F>(&self, query: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> T + Send + 'static,
    {
        let (reply, response) = mpsc::channel();
        let job: StoreQuery = Box::new(move |store| {
            let _ = reply.send(query(store));
        });
        self.commands
            .send(Command::Query(job))
            .map_err(|_| Error::WorkerGone)?;
        response.recv().map_err(|_| Error::WorkerGone)
    }

    /// Stop any running operation and join the worker.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        let _ = self.commands.send(Command::Shutdown);
        handle.join().map_err(|_| Error::WorkerGone)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Monitor worker did not shut down cleanly: {}", e);
        }
    }
}
