//! Weaver Core
//!
//! Shared model for the Weaver kernel: process records, the concurrent process
//! registry that is the single source of truth for kernel-known state, and the
//! structured event sink every component reports through.

pub mod error;
pub mod event;
pub mod model;
pub mod registry;

pub use error::{RegistryError, Result};
pub use event::{EventSink, Frontend, KernelEvent, RecordingSink, StartStep, TracingSink};
pub use model::{ProcessRecord, ProcessStatus, ProcessSummary, StatusReport};
pub use registry::ProcessRegistry;
