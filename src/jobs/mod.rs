//! Job orchestration
//!
//! The per-job state machine ([`runner`]) and the process-wide registry of
//! live jobs ([`registry`]).

mod registry;
mod runner;

pub use registry::{JobHandle, JobRegistry};
pub use runner::{AtomicCounters, JobRunner};
