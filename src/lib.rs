//! Bunker Cache Hierarchy Simulator Library.
//!
//! This crate implements a timing-accurate model of a two-level cache
//! hierarchy (L1 and a radix/stride indexed "Bunker" L2) sitting between a
//! trace-driven requester and main memory. Every component communicates over
//! a blocking request/response port protocol and advances through a single
//! discrete-event scheduler.
//!
//! # Architecture
//!
//! * **Cache**: Bunker indexer, block store, replacement policies and the
//!   blocking cache controller state machine.
//! * **SoC**: Port transport, memory endpoint and the system builder.
//! * **Sim**: Event scheduler and trace loading.
//!
//! # Modules
//!
//! * `cache`: Cache storage, indexing and controller.
//! * `common`: Packets, address ranges and error types.
//! * `config`: Configuration loading and validation.
//! * `core`: Trace-driven requester standing in for the CPU.
//! * `sim`: Event scheduler and trace loader.
//! * `soc`: Port transport, memory endpoint and system assembly.
//! * `stats`: Performance statistics collection.

/// Cache storage, Bunker indexing, replacement policies and the controller.
///
/// Implements the blocking cache object: address decoding with the
/// radix/stride scheme, associative line storage and the request state
/// machine that forwards misses to the next level.
pub mod cache;

/// Shared types, constants, and error handling.
///
/// Provides packets, memory commands, address ranges and the error taxonomy
/// used throughout the simulator.
pub mod common;

/// Configuration system for caches, memory and the system back-reference.
///
/// Loads and parses TOML configuration files and validates cache parameters
/// into strongly typed structures.
pub mod config;

/// Requester models that drive memory traffic into the hierarchy.
pub mod core;

/// Simulation scheduler and workload loaders.
///
/// Owns the simulated clock and the ordered event queue, and parses access
/// traces for the requester.
pub mod sim;

/// System-on-Chip plumbing: ports, memory and the system container.
///
/// Implements the port transport that enforces the blocking protocol, the
/// main memory endpoint and the builder that wires the hierarchy together.
pub mod soc;

/// Performance statistics collection and reporting.
///
/// Tracks hits, misses, write-backs and miss latency per cache level.
pub mod stats;
