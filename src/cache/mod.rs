//! Cache Subsystem.
//!
//! * `indexer`: radix/stride address decoding.
//! * `store`: line storage grouped by index.
//! * `policies`: victim selection within an index.
//! * `controller`: the blocking request state machine.

pub mod controller;
pub mod indexer;
pub mod policies;
pub mod store;

pub use controller::{CacheController, ControllerState};
pub use indexer::{BunkerIndexer, Decoded};
pub use store::{BlockStore, CacheLine, EvictedLine, Lookup};
