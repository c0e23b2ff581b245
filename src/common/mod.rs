//! Common utilities and types used throughout the cache simulator.
//!
//! This module provides fundamental types for addresses, packets and error
//! handling that are shared by the caches, the port transport and the
//! memory endpoint.

/// Address range definitions.
pub mod addr;

/// Packet and memory command definitions.
pub mod data;

/// Error types for configuration and protocol failures.
pub mod error;

pub use addr::{Addr, AddrRange, Tick};
pub use data::{MemCmd, Packet, PacketId};
pub use error::{ConfigError, ProtocolViolation, SimError};
