//! Requester models.
//!
//! The hierarchy is driven by a trace-replaying requester in place of a CPU
//! pipeline.

/// Trace-driven requester.
pub mod cpu;

pub use cpu::{Access, AccessKind, Completion, Requester};
