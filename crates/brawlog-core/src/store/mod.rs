//! The store of applied event records.
//!
//! A `Store` holds records in arrival order plus the aggregate tables
//! derived from them. Content lives behind an `Arc`, so a snapshot is a
//! reference-count bump and the first mutation after it copies.
//!
//! Outside a bulk scope every applied record is appended to the backing file
//! before observers hear about it. A bulk scope defers both the file write
//! and the notifications to its commit.

pub mod format;
mod tables;
mod view;

pub use tables::{ActorTotals, Tables};
pub use view::StoreView;

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dispatch::{
    ChangeDescriptor, ChangePhase, Dispatcher, ObserverId, ResetReason, StoreObserver,
};
use crate::error::{Error, Result};
use crate::record::{EventRecord, Provenance};
use crate::source::SourceDescriptor;
use format::{StoreHeader, atomic_write, encode_header, encode_record, parse_header, parse_record};

/// Records written between progress callbacks while saving.
const SAVE_PROGRESS_STEP: u64 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreContent {
    records: Vec<EventRecord>,
    tables: Tables,
    last_sequence: HashMap<Provenance, u64>,
}

impl StoreContent {
    fn last_sequence(&self, provenance: Provenance) -> u64 {
        self.last_sequence.get(&provenance).copied().unwrap_or(0)
    }

    fn check_sequence(&self, record: &EventRecord) -> Result<()> {
        let expected = self.last_sequence(record.provenance) + 1;
        if record.sequence != expected {
            return Err(Error::OutOfOrder {
                provenance: record.provenance,
                expected,
                actual: record.sequence,
            });
        }
        Ok(())
    }

    fn push(&mut self, record: EventRecord) {
        self.tables.apply(&record);
        self.last_sequence.insert(record.provenance, record.sequence);
        self.records.push(record);
    }
}

/// Opaque handle to a previous store state, including the file it was
/// backed by.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    content: Arc<StoreContent>,
    header: StoreHeader,
    path: Option<PathBuf>,
}

impl StoreSnapshot {
    pub fn len(&self) -> usize {
        self.content.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.records.is_empty()
    }
}

#[derive(Debug)]
pub struct Store {
    content: Arc<StoreContent>,
    header: StoreHeader,
    path: Option<PathBuf>,
    dispatcher: Dispatcher,
}

impl Store {
    /// An empty store with no backing file.
    pub fn in_memory() -> Self {
        Self {
            content: Arc::default(),
            header: StoreHeader::new(None),
            path: None,
            dispatcher: Dispatcher::new(),
        }
    }

    /// Create an empty store file at `path`, replacing any existing file.
    pub fn create<P: AsRef<Path>>(path: P, origin: Option<SourceDescriptor>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let header = StoreHeader::new(origin);
        atomic_write(&path, &format!("{}\n", encode_header(&header)?))?;
        info!("Created store {}", path.display());

        Ok(Self {
            content: Arc::default(),
            header,
            path: Some(path),
            dispatcher: Dispatcher::new(),
        })
    }

    /// Load a store file written earlier.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = fs::read_to_string(&path)?;
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i as u64 + 1, line))
            .filter(|(_, line)| !line.trim().is_empty());

        let header = match lines.next() {
            Some((line_no, line)) => parse_header(line, line_no)?,
            None => return Err(Error::decode(0, format!("{} is empty", path.display()))),
        };

        let mut content = StoreContent::default();
        for (line_no, line) in lines {
            let record = parse_record(line, line_no)?.into_record(None)?;
            // Purged stores have gaps, so only the ordering is checked here.
            let last = content.last_sequence(record.provenance);
            if record.sequence <= last {
                return Err(Error::OutOfOrder {
                    provenance: record.provenance,
                    expected: last + 1,
                    actual: record.sequence,
                });
            }
            content.push(record);
        }

        info!(
            "Opened store {} ({} records, version {})",
            path.display(),
            content.records.len(),
            header.version
        );
        Ok(Self {
            content: Arc::new(content),
            header,
            path: Some(path),
            dispatcher: Dispatcher::new(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    /// The live source that fed this store, if recorded.
    pub fn origin(&self) -> Option<&SourceDescriptor> {
        self.header.origin.as_ref()
    }

    pub fn len(&self) -> usize {
        self.content.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.records.is_empty()
    }

    pub fn last_sequence(&self, provenance: Provenance) -> u64 {
        self.content.last_sequence(provenance)
    }

    pub fn view(&self) -> StoreView<'_> {
        StoreView::new(&self.content, self.path.as_deref())
    }

    pub fn subscribe(&mut self, observer: Box<dyn StoreObserver>) -> ObserverId {
        self.dispatcher.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Apply one record.
    ///
    /// The record's sequence must be exactly one past the last applied for
    /// its provenance. On error nothing was persisted or announced.
    pub fn apply(&mut self, record: EventRecord) -> Result<()> {
        self.content.check_sequence(&record)?;
        if let Some(path) = &self.path {
            append_line(path, &encode_record(&record)?)?;
        }

        let change = ChangeDescriptor::Record {
            sequence: record.sequence,
            provenance: record.provenance,
            kind: record.kind(),
        };
        self.notify(ChangePhase::Before, &change);
        Arc::make_mut(&mut self.content).push(record);
        self.notify(ChangePhase::After, &change);
        Ok(())
    }

    /// Start a bulk scope. Dropping it without `commit` rolls back.
    pub fn begin_bulk(&mut self) -> BulkApply<'_> {
        BulkApply {
            base: Arc::clone(&self.content),
            store: self,
            count: 0,
            first: None,
            last: None,
            committed: false,
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            content: Arc::clone(&self.content),
            header: self.header.clone(),
            path: self.path.clone(),
        }
    }

    /// Return to `snapshot`, announcing a single reset.
    ///
    /// The snapshot's backing file comes back along with its content, even
    /// if another store was swapped in since. In-memory content is always
    /// restored. A file-backed snapshot is then rewritten; an error from
    /// that rewrite is returned.
    pub fn restore(&mut self, snapshot: StoreSnapshot) -> Result<()> {
        if Arc::ptr_eq(&self.content, &snapshot.content)
            && self.header == snapshot.header
            && self.path == snapshot.path
        {
            debug!("Store unchanged since snapshot");
            return Ok(());
        }

        info!(
            "Restoring store to snapshot ({} -> {} records)",
            self.len(),
            snapshot.len()
        );
        self.replace(
            snapshot.content,
            snapshot.header,
            snapshot.path,
            ResetReason::Restored,
        );
        self.save()
    }

    /// Take over the content, header and file of `other`, keeping this
    /// store's observers. Observers see one reset.
    pub fn swap_content(&mut self, other: Store, reason: ResetReason) {
        let Store {
            content,
            header,
            path,
            dispatcher,
        } = other;
        if !dispatcher.is_empty() {
            debug!("Dropping {} observers of swapped-in store", dispatcher.len());
        }
        info!(
            "Swapping in {} ({} records)",
            path.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in-memory store".to_string()),
            content.records.len()
        );
        self.replace(content, header, path, reason);
    }

    /// Remove every chat record. Returns how many were removed.
    pub fn purge_chat_info(&mut self) -> Result<usize> {
        let before = self.len();
        let records: Vec<EventRecord> = self
            .content
            .records
            .iter()
            .filter(|r| !r.payload.is_chat())
            .cloned()
            .collect();
        let removed = before - records.len();
        if removed == 0 {
            return Ok(0);
        }

        let content = StoreContent {
            tables: Tables::rebuild(&records),
            records,
            last_sequence: self.content.last_sequence.clone(),
        };
        let (header, path) = (self.header.clone(), self.path.clone());
        self.replace(Arc::new(content), header, path, ResetReason::ChatPurged);
        self.save()?;
        info!("Purged {} chat records", removed);
        Ok(removed)
    }

    /// Rewrite the backing file, if any, from memory.
    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.write_file(path, &mut |_, _| {}),
            None => Ok(()),
        }
    }

    /// Write a copy of the store to `path` without changing its backing file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write_file(path.as_ref(), &mut |_, _| {})
    }

    /// Write the store to `path` and make that its backing file.
    ///
    /// Reports `(written, total)` as records are serialized.
    pub fn save_as<P, F>(&mut self, path: P, mut on_progress: F) -> Result<()>
    where
        P: AsRef<Path>,
        F: FnMut(u64, u64),
    {
        let path = path.as_ref().to_path_buf();
        self.write_file(&path, &mut on_progress)?;
        self.path = Some(path);
        Ok(())
    }

    fn write_file(&self, path: &Path, on_progress: &mut dyn FnMut(u64, u64)) -> Result<()> {
        let total = self.content.records.len() as u64;
        let mut out = encode_header(&self.header)?;
        out.push('\n');
        for (i, record) in self.content.records.iter().enumerate() {
            out.push_str(&encode_record(record)?);
            out.push('\n');
            let written = i as u64 + 1;
            if written % SAVE_PROGRESS_STEP == 0 && written < total {
                on_progress(written, total);
            }
        }
        atomic_write(path, &out)?;
        on_progress(total, total);
        Ok(())
    }

    fn replace(
        &mut self,
        content: Arc<StoreContent>,
        header: StoreHeader,
        path: Option<PathBuf>,
        reason: ResetReason,
    ) {
        let change = ChangeDescriptor::Reset { reason };
        self.notify(ChangePhase::Before, &change);
        self.content = content;
        self.header = header;
        self.path = path;
        self.notify(ChangePhase::After, &change);
    }

    fn notify(&mut self, phase: ChangePhase, change: &ChangeDescriptor) -> usize {
        let view = StoreView::new(&self.content, self.path.as_deref());
        self.dispatcher.notify(phase, change, &view)
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let result = OpenOptions::new()
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{}", line).and_then(|_| file.flush()));
    result.map_err(|e| Error::Persistence(format!("append to {}: {}", path.display(), e)))
}

/// A bulk apply scope.
///
/// Records are validated and applied in memory as they arrive. `commit`
/// writes the backing file once and announces a single `Bulk` change.
pub struct BulkApply<'s> {
    store: &'s mut Store,
    base: Arc<StoreContent>,
    count: u64,
    first: Option<u64>,
    last: Option<u64>,
    committed: bool,
}

impl BulkApply<'_> {
    pub fn apply(&mut self, record: EventRecord) -> Result<()> {
        self.store.content.check_sequence(&record)?;
        let sequence = record.sequence;
        Arc::make_mut(&mut self.store.content).push(record);
        self.count += 1;
        self.first.get_or_insert(sequence);
        self.last = Some(sequence);
        Ok(())
    }

    pub fn applied(&self) -> u64 {
        self.count
    }

    pub fn commit(self) -> Result<u64> {
        self.commit_with_progress(|_, _| {})
    }

    /// Commit, reporting `(written, total)` while the backing file is saved.
    pub fn commit_with_progress<F>(mut self, mut on_progress: F) -> Result<u64>
    where
        F: FnMut(u64, u64),
    {
        if self.count > 0 {
            if let Some(path) = self.store.path.clone() {
                self.store.write_file(&path, &mut on_progress)?;
            }

            let change = ChangeDescriptor::Bulk {
                count: self.count,
                first: self.first,
                last: self.last,
            };
            let store = &mut *self.store;
            let before = StoreView::new(&self.base, store.path.as_deref());
            store.dispatcher.notify(ChangePhase::Before, &change, &before);
            store.notify(ChangePhase::After, &change);
        }
        self.committed = true;
        Ok(self.count)
    }
}

impl Drop for BulkApply<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if self.count > 0 {
                warn!("Rolling back {} uncommitted records", self.count);
            }
            self.store.content = Arc::clone(&self.base);
        }
    }
}
