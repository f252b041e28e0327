use std::path::Path;

use crate::record::{EventRecord, Provenance};
use crate::store::StoreContent;
use crate::store::tables::Tables;

/// Read-only view of store content handed to observers and queries.
#[derive(Debug, Clone, Copy)]
pub struct StoreView<'a> {
    content: &'a StoreContent,
    path: Option<&'a Path>,
}

impl<'a> StoreView<'a> {
    pub(crate) fn new(content: &'a StoreContent, path: Option<&'a Path>) -> Self {
        Self { content, path }
    }

    pub fn records(&self) -> &'a [EventRecord] {
        &self.content.records
    }

    pub fn len(&self) -> usize {
        self.content.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.records.is_empty()
    }

    pub fn last(&self) -> Option<&'a EventRecord> {
        self.content.records.last()
    }

    /// Last applied sequence for `provenance`, 0 if none.
    pub fn last_sequence(&self, provenance: Provenance) -> u64 {
        self.content.last_sequence(provenance)
    }

    pub fn tables(&self) -> &'a Tables {
        &self.content.tables
    }

    /// Backing file, if the store is file-backed.
    pub fn path(&self) -> Option<&'a Path> {
        self.path
    }
}
