pub mod config;
pub mod debug;
pub mod dispatch;
pub mod error;
pub mod monitor;
pub mod process;
pub mod record;
pub mod retry;
pub mod source;
pub mod store;

pub use config::Config;
pub use debug::ScanReport;
pub use dispatch::{ChangeDescriptor, ChangePhase, ObserverId, ResetReason, StoreObserver};
pub use error::{Error, ErrorKind, Result};
pub use monitor::{
    FailureDetail, Monitor, MonitorInterrupt, MonitorOptions, MonitorState, OperationMode,
    StatusEvent, StatusTrigger,
};
pub use process::{MemoryReader, ProcessHandle};
pub use record::{EventRecord, Payload, PayloadKind, Provenance};
pub use source::{
    ChatLogLayout, ImportSourceType, ProgressState, ProgressStatus, SourceDescriptor, SourceKind,
};
pub use store::{Store, StoreSnapshot, StoreView, Tables};
