//! Configuration system for the cache hierarchy simulator.
//!
//! This module defines the configuration structures deserialized from TOML:
//! 1. **Defaults:** Baseline sizes, latencies and memory timings.
//! 2. **Structures:** General, system, memory and per-cache settings.
//! 3. **Validation:** `CacheParams`, the strongly typed, validated parameter
//!    set every cache controller is built from.

use crate::cache::indexer::BunkerIndexer;
use crate::common::{AddrRange, ConfigError, Tick};
use serde::Deserialize;
use std::convert::TryFrom;
use std::fmt;

/// Default configuration constants.
mod defaults {
    /// Cache line size in bytes.
    pub const BLOCK_SIZE: usize = 64;

    /// Physical address width in bits.
    pub const ADDRESS_BITS: u32 = 48;

    /// CPU-side connections of the L1 (instruction and data port).
    pub const CPU_PORTS: usize = 1;

    /// Cache capacity when none is given.
    pub const CACHE_SIZE: u64 = 16 * 1024;

    /// Cycles per hit or per completed miss.
    pub const CACHE_LATENCY: u64 = 1;

    /// Size of the main memory range.
    pub const MEMORY_SIZE: u64 = 1024 * 1024 * 1024;

    /// Fixed access latency of the simple memory controller.
    pub const ROW_MISS_LATENCY: u64 = 100;

    /// DRAM column access strobe latency.
    pub const T_CAS: u64 = 14;

    /// DRAM row access strobe latency.
    pub const T_RAS: u64 = 14;

    /// DRAM precharge latency.
    pub const T_PRE: u64 = 14;

    /// Seed for random replacement.
    pub const SEED: u64 = 1;
}

/// A memory size in bytes.
///
/// Deserializes from an integer or from a unit-suffixed string such as
/// `"16kB"`, `"1024kB"` or `"1MB"`. Unit prefixes are powers of 1024.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "MemSizeRepr")]
pub struct MemSize(pub u64);

#[derive(Deserialize)]
#[serde(untagged)]
enum MemSizeRepr {
    Bytes(u64),
    Text(String),
}

impl TryFrom<MemSizeRepr> for MemSize {
    type Error = ConfigError;

    fn try_from(repr: MemSizeRepr) -> Result<Self, Self::Error> {
        match repr {
            MemSizeRepr::Bytes(n) => Ok(MemSize(n)),
            MemSizeRepr::Text(s) => MemSize::parse(&s),
        }
    }
}

impl MemSize {
    /// Parses a size string (`"128kB"`, `"1MB"`, `"4096"`, `"0x1000"`).
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let s = text.trim();
        let invalid = || ConfigError::InvalidMemSize(text.to_string());

        if let Some(hex) = s.strip_prefix("0x") {
            return u64::from_str_radix(hex, 16).map(MemSize).map_err(|_| invalid());
        }

        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let value: u64 = digits.parse().map_err(|_| invalid())?;

        let multiplier: u64 = match unit.trim() {
            "" | "B" => 1,
            "k" | "K" | "kB" | "KB" | "KiB" => 1 << 10,
            "M" | "MB" | "MiB" => 1 << 20,
            "G" | "GB" | "GiB" => 1 << 30,
            _ => return Err(invalid()),
        };

        value.checked_mul(multiplier).map(MemSize).ok_or_else(invalid)
    }

    /// Returns the size in bytes.
    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MemSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        if b >= 1 << 20 && b % (1 << 20) == 0 {
            write!(f, "{}MB", b >> 20)
        } else if b >= 1 << 10 && b % (1 << 10) == 0 {
            write!(f, "{}kB", b >> 10)
        } else {
            write!(f, "{}B", b)
        }
    }
}

/// Memory controller implementation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MemoryController {
    /// Fixed-latency memory.
    #[default]
    Simple,
    /// DRAM timing with an open-row buffer.
    #[serde(alias = "DRAM")]
    Dram,
}

/// Victim selection among the `radix` slots of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    /// Least Recently Used.
    #[default]
    #[serde(alias = "Lru")]
    Lru,
    /// First In First Out (round robin over the slots).
    #[serde(alias = "Fifo", alias = "RoundRobin")]
    Fifo,
    /// Uniformly random slot.
    #[serde(alias = "Random")]
    Random,
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Simulation driver settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Global parameters every cache refers back to.
    #[serde(default)]
    pub system: SystemConfig,
    /// Main memory.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// First-level cache.
    #[serde(default)]
    pub l1: CacheConfig,
    /// Second-level (Bunker) cache.
    #[serde(default = "CacheConfig::default_l2")]
    pub l2: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            system: SystemConfig::default(),
            memory: MemoryConfig::default(),
            l1: CacheConfig::default(),
            l2: CacheConfig::default_l2(),
        }
    }
}

/// Simulation driver settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneralConfig {
    /// Stop after this tick even if work is pending.
    #[serde(default)]
    pub max_ticks: Option<Tick>,

    /// Enable protocol tracing.
    #[serde(default)]
    pub trace: bool,

    /// Cycles the requester waits between a response and its next request.
    #[serde(default)]
    pub issue_gap: Tick,
}

/// Global parameters shared by every component (the `system` back-reference).
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    /// Cache line size in bytes.
    #[serde(default = "SystemConfig::default_block_size")]
    pub block_size: usize,

    /// Physical address width in bits.
    #[serde(default = "SystemConfig::default_address_bits")]
    pub address_bits: u32,

    /// Number of CPU-side connections to the L1.
    #[serde(default = "SystemConfig::default_cpu_ports")]
    pub cpu_ports: usize,
}

impl SystemConfig {
    fn default_block_size() -> usize {
        defaults::BLOCK_SIZE
    }

    fn default_address_bits() -> u32 {
        defaults::ADDRESS_BITS
    }

    fn default_cpu_ports() -> usize {
        defaults::CPU_PORTS
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            block_size: defaults::BLOCK_SIZE,
            address_bits: defaults::ADDRESS_BITS,
            cpu_ports: defaults::CPU_PORTS,
        }
    }
}

/// Main memory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Latency model.
    #[serde(default)]
    pub controller: MemoryController,

    /// First address served by memory.
    #[serde(default)]
    pub range_base: u64,

    /// Bytes served by memory.
    #[serde(default = "MemoryConfig::default_range_size")]
    pub range_size: MemSize,

    /// Fixed latency of the simple controller.
    #[serde(default = "MemoryConfig::default_row_miss")]
    pub row_miss_latency: u64,

    /// DRAM column access strobe latency.
    #[serde(default = "MemoryConfig::default_t_cas")]
    pub t_cas: u64,

    /// DRAM row access strobe latency.
    #[serde(default = "MemoryConfig::default_t_ras")]
    pub t_ras: u64,

    /// DRAM precharge latency.
    #[serde(default = "MemoryConfig::default_t_pre")]
    pub t_pre: u64,
}

impl MemoryConfig {
    fn default_range_size() -> MemSize {
        MemSize(defaults::MEMORY_SIZE)
    }

    fn default_row_miss() -> u64 {
        defaults::ROW_MISS_LATENCY
    }

    fn default_t_cas() -> u64 {
        defaults::T_CAS
    }

    fn default_t_ras() -> u64 {
        defaults::T_RAS
    }

    fn default_t_pre() -> u64 {
        defaults::T_PRE
    }

    /// Returns the validated address range served by memory.
    pub fn range(&self) -> Result<AddrRange, ConfigError> {
        let size = self.range_size.bytes();
        if size == 0 || self.range_base.checked_add(size).is_none() {
            return Err(ConfigError::InvalidMemoryRange {
                start: self.range_base,
                size,
            });
        }
        Ok(AddrRange::new(self.range_base, size))
    }

    /// Returns an error if any latency the selected controller uses is zero.
    pub fn validate_latency(&self) -> Result<(), ConfigError> {
        let zero = match self.controller {
            MemoryController::Simple => self.row_miss_latency == 0,
            MemoryController::Dram => self.t_cas == 0,
        };
        if zero {
            return Err(ConfigError::ZeroLatency("memory".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            controller: MemoryController::Simple,
            range_base: 0,
            range_size: MemSize(defaults::MEMORY_SIZE),
            row_miss_latency: defaults::ROW_MISS_LATENCY,
            t_cas: defaults::T_CAS,
            t_ras: defaults::T_RAS,
            t_pre: defaults::T_PRE,
        }
    }
}

/// Per-cache settings as written in the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Whether the level exists.
    #[serde(default = "CacheConfig::default_enabled")]
    pub enabled: bool,

    /// Capacity.
    #[serde(default = "CacheConfig::default_size")]
    pub size: MemSize,

    /// Cycles per hit or per completed miss.
    #[serde(default = "CacheConfig::default_latency")]
    pub latency: u64,

    /// Slots per index.
    #[serde(default = "CacheConfig::default_radix")]
    pub radix: usize,

    /// Interleave distance between consecutive blocks.
    #[serde(default = "CacheConfig::default_stride")]
    pub stride: usize,

    /// Victim selection.
    #[serde(default)]
    pub policy: ReplacementPolicy,

    /// Allocate a line on a write miss (fill then write).
    #[serde(default = "CacheConfig::default_write_allocate")]
    pub write_allocate: bool,

    /// Seed for random replacement.
    #[serde(default = "CacheConfig::default_seed")]
    pub seed: u64,
}

impl CacheConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_size() -> MemSize {
        MemSize(defaults::CACHE_SIZE)
    }

    fn default_latency() -> u64 {
        defaults::CACHE_LATENCY
    }

    fn default_radix() -> usize {
        1
    }

    fn default_stride() -> usize {
        1
    }

    fn default_write_allocate() -> bool {
        true
    }

    fn default_seed() -> u64 {
        defaults::SEED
    }

    /// The L2 is absent unless configured.
    fn default_l2() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: MemSize(defaults::CACHE_SIZE),
            latency: defaults::CACHE_LATENCY,
            radix: 1,
            stride: 1,
            policy: ReplacementPolicy::Lru,
            write_allocate: true,
            seed: defaults::SEED,
        }
    }
}

/// Validated parameters of one cache controller.
///
/// Built once from a `CacheConfig` and the `SystemConfig`; every invalid
/// combination is rejected here so the controller itself never fails on
/// geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheParams {
    /// Instance name used for ports, logs and statistics.
    pub name: String,
    /// Address decoding geometry.
    pub indexer: BunkerIndexer,
    /// Cycles per hit or per completed miss.
    pub latency: Tick,
    /// Victim selection.
    pub policy: ReplacementPolicy,
    /// Allocate a line on a write miss.
    pub write_allocate: bool,
    /// Seed for random replacement.
    pub seed: u64,
    /// Number of upstream ports.
    pub cpu_ports: usize,
}

impl CacheParams {
    /// Validates a cache configuration against the system parameters.
    pub fn new(
        name: &str,
        cache: &CacheConfig,
        system: &SystemConfig,
        cpu_ports: usize,
    ) -> Result<Self, ConfigError> {
        if cache.latency == 0 {
            return Err(ConfigError::ZeroLatency(name.to_string()));
        }
        if cpu_ports == 0 {
            return Err(ConfigError::NoPorts(name.to_string()));
        }

        let indexer = BunkerIndexer::new(
            cache.size.bytes(),
            system.block_size,
            cache.radix,
            cache.stride,
            system.address_bits,
        )?;

        Ok(Self {
            name: name.to_string(),
            indexer,
            latency: cache.latency,
            policy: cache.policy,
            write_allocate: cache.write_allocate,
            seed: cache.seed,
            cpu_ports,
        })
    }

    /// Cache line size in bytes.
    pub fn block_size(&self) -> usize {
        self.indexer.block_size()
    }

    /// Capacity in bytes.
    pub fn size(&self) -> u64 {
        self.indexer.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unit_suffixed_sizes() {
        assert_eq!(MemSize::parse("16kB"), Ok(MemSize(16 * 1024)));
        assert_eq!(MemSize::parse("1024kB"), Ok(MemSize(1024 * 1024)));
        assert_eq!(MemSize::parse("1MB"), Ok(MemSize(1 << 20)));
        assert_eq!(MemSize::parse("1024MB"), Ok(MemSize(1 << 30)));
        assert_eq!(MemSize::parse("4096"), Ok(MemSize(4096)));
        assert_eq!(MemSize::parse("0x1000"), Ok(MemSize(4096)));
        assert!(MemSize::parse("12 parsecs").is_err());
        assert!(MemSize::parse("kB").is_err());
    }

    #[test]
    fn size_display_picks_largest_exact_unit() {
        assert_eq!(MemSize(128 * 1024).to_string(), "128kB");
        assert_eq!(MemSize(2 << 20).to_string(), "2MB");
        assert_eq!(MemSize(100).to_string(), "100B");
    }
}
