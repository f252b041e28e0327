//! Change notification fan-out from the store to its observers.
//!
//! Every store mutation is announced twice, once before and once after it
//! takes effect. Delivery is synchronous and in subscription order, so all
//! observers see the same fully ordered history. A failing or panicking
//! observer is logged and skipped; it never affects the store.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::Serialize;
use strum::Display;
use tracing::{error, trace, warn};

use crate::record::{PayloadKind, Provenance};
use crate::store::StoreView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "lowercase")]
pub enum ChangePhase {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResetReason {
    /// Rolled back to a snapshot.
    Restored,
    /// Content replaced by a finished import or reparse.
    Swapped,
    /// Another store file was opened or created.
    Opened,
    ChatPurged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ChangeDescriptor {
    Record {
        sequence: u64,
        provenance: Provenance,
        kind: PayloadKind,
    },
    Bulk {
        count: u64,
        first: Option<u64>,
        last: Option<u64>,
    },
    /// Whole content replaced; observers should rebuild from the view.
    Reset { reason: ResetReason },
}

/// Receiver of store change notifications.
///
/// The view passed with `Before` shows the store as it was, the view passed
/// with `After` shows it as it now is.
pub trait StoreObserver: Send {
    fn name(&self) -> &str {
        "observer"
    }

    fn on_change(
        &mut self,
        phase: ChangePhase,
        change: &ChangeDescriptor,
        view: &StoreView<'_>,
    ) -> anyhow::Result<()>;
}

impl<F> StoreObserver for F
where
    F: FnMut(ChangePhase, &ChangeDescriptor, &StoreView<'_>) -> anyhow::Result<()> + Send,
{
    fn on_change(
        &mut self,
        phase: ChangePhase,
        change: &ChangeDescriptor,
        view: &StoreView<'_>,
    ) -> anyhow::Result<()> {
        self(phase, change, view)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

#[derive(Default)]
pub struct Dispatcher {
    observers: Vec<(ObserverId, Box<dyn StoreObserver>)>,
    next_id: u64,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn StoreObserver>) -> ObserverId {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        trace!("Subscribed {} as {:?}", observer.name(), id);
        self.observers.push((id, observer));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver one notification to every observer. Returns how many failed.
    pub fn notify(
        &mut self,
        phase: ChangePhase,
        change: &ChangeDescriptor,
        view: &StoreView<'_>,
    ) -> usize {
        let mut failures = 0;
        for (id, observer) in &mut self.observers {
            let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_change(phase, change, view)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(
                        "Observer {} ({:?}) failed on {} {:?}: {:#}",
                        observer.name(),
                        id,
                        phase,
                        change,
                        e
                    );
                }
                Err(panic) => {
                    failures += 1;
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(
                        "Observer {} ({:?}) panicked on {} notification: {}",
                        observer.name(),
                        id,
                        phase,
                        message
                    );
                }
            }
        }
        failures
    }
}
