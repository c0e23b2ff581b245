//! Simulation harness: the event scheduler and the trace loader.

/// Discrete event queue and simulated clock.
pub mod event;

/// Access trace parsing.
pub mod loader;

pub use event::{EventQueue, Fired};
