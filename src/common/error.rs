//! Error Types.
//!
//! Two classes of failure abort a simulation: configuration errors, raised
//! while components are constructed, and protocol violations, raised when a
//! component observes traffic that the blocking protocol forbids. Transient
//! backpressure is not an error and never appears here.

use super::addr::Addr;
use super::data::PacketId;
use std::fmt;

/// Invalid construction parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Block size is zero or not a power of two.
    InvalidBlockSize(usize),
    /// Cache size is zero or not a multiple of the block size.
    InvalidCacheSize { size: u64, block_size: usize },
    /// Radix is zero or does not divide the number of blocks exactly.
    InvalidRadix { radix: usize, blocks: usize },
    /// Stride is zero or shares a factor with the number of indices.
    InvalidStride { stride: usize, indices: usize },
    /// A latency of zero cycles.
    ZeroLatency(String),
    /// Cache is larger than the addressable space.
    ExceedsAddressSpace { size: u64, address_bits: u32 },
    /// Address width outside `1..=64`.
    InvalidAddressBits(u32),
    /// A cache or requester without upstream ports.
    NoPorts(String),
    /// Memory range of size zero or overflowing the address space.
    InvalidMemoryRange { start: Addr, size: u64 },
    /// A memory size string that could not be parsed.
    InvalidMemSize(String),
    /// A port connected twice.
    PortAlreadyConnected(String),
    /// Two request ports or two response ports connected together.
    PortRoleMismatch { master: String, slave: String },
    /// A hierarchy shape the builder cannot wire.
    UnsupportedTopology(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBlockSize(size) => {
                write!(f, "block size {} is not a non-zero power of two", size)
            }
            ConfigError::InvalidCacheSize { size, block_size } => write!(
                f,
                "cache size {} is not a non-zero multiple of block size {}",
                size, block_size
            ),
            ConfigError::InvalidRadix { radix, blocks } => write!(
                f,
                "radix {} does not divide the {} blocks of the cache",
                radix, blocks
            ),
            ConfigError::InvalidStride { stride, indices } => write!(
                f,
                "stride {} does not cover all {} indices (must be non-zero and coprime)",
                stride, indices
            ),
            ConfigError::ZeroLatency(name) => write!(f, "{}: latency must be positive", name),
            ConfigError::ExceedsAddressSpace { size, address_bits } => write!(
                f,
                "cache size {} exceeds a {}-bit address space",
                size, address_bits
            ),
            ConfigError::InvalidAddressBits(bits) => {
                write!(f, "address width {} outside 1..=64", bits)
            }
            ConfigError::NoPorts(name) => write!(f, "{}: at least one port is required", name),
            ConfigError::InvalidMemoryRange { start, size } => write!(
                f,
                "memory range {:#x}+{:#x} is empty or overflows",
                start, size
            ),
            ConfigError::InvalidMemSize(text) => write!(f, "cannot parse memory size '{}'", text),
            ConfigError::PortAlreadyConnected(name) => {
                write!(f, "port {} is already connected", name)
            }
            ConfigError::PortRoleMismatch { master, slave } => write!(
                f,
                "cannot connect {} to {}: expected a request port and a response port",
                master, slave
            ),
            ConfigError::UnsupportedTopology(msg) => write!(f, "unsupported topology: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Traffic that the blocking port protocol forbids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A request was sent on a port that already has one in flight.
    PortOccupied { port: String },
    /// A response arrived for a request nobody is tracking.
    UnexpectedResponse {
        component: String,
        id: PacketId,
        addr: Addr,
    },
    /// A response was sent on a port with no accepted request.
    NoPendingRequest { port: String, id: PacketId },
    /// Traffic on a port that is not connected.
    UnconnectedPort { port: String },
    /// An access that crosses a block boundary.
    SpansBlocks {
        addr: Addr,
        size: usize,
        block_size: usize,
    },
    /// An access outside every memory range.
    UnmappedAddress { addr: Addr, size: usize },
    /// A response command sent as a request, or the reverse.
    WrongDirection { port: String },
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolViolation::PortOccupied { port } => {
                write!(f, "request sent on occupied port {}", port)
            }
            ProtocolViolation::UnexpectedResponse {
                component,
                id,
                addr,
            } => write!(
                f,
                "{} received response {} for untracked request at {:#x}",
                component, id, addr
            ),
            ProtocolViolation::NoPendingRequest { port, id } => write!(
                f,
                "response {} sent on port {} without a pending request",
                id, port
            ),
            ProtocolViolation::UnconnectedPort { port } => {
                write!(f, "port {} is not connected", port)
            }
            ProtocolViolation::SpansBlocks {
                addr,
                size,
                block_size,
            } => write!(
                f,
                "access {:#x}+{} spans more than one {}-byte block",
                addr, size, block_size
            ),
            ProtocolViolation::UnmappedAddress { addr, size } => {
                write!(f, "access {:#x}+{} is outside every memory range", addr, size)
            }
            ProtocolViolation::WrongDirection { port } => {
                write!(f, "packet sent in the wrong direction on port {}", port)
            }
        }
    }
}

impl std::error::Error for ProtocolViolation {}

/// Any fatal simulation error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimError {
    /// Invalid construction parameters.
    Config(ConfigError),
    /// Forbidden traffic observed at runtime.
    Protocol(ProtocolViolation),
    /// A malformed line in an access trace.
    Trace { line: usize, message: String },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Config(e) => write!(f, "configuration error: {}", e),
            SimError::Protocol(e) => write!(f, "protocol violation: {}", e),
            SimError::Trace { line, message } => write!(f, "trace line {}: {}", line, message),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::Config(e) => Some(e),
            SimError::Protocol(e) => Some(e),
            SimError::Trace { .. } => None,
        }
    }
}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        SimError::Config(e)
    }
}

impl From<ProtocolViolation> for SimError {
    fn from(e: ProtocolViolation) -> Self {
        SimError::Protocol(e)
    }
}
