//! Address Types.
//!
//! Physical addresses are plain `u64` values; this module adds the address
//! range type used by memory endpoints to advertise what they serve and by
//! caches to forward those ranges upstream.

use serde::Serialize;
use std::fmt;

/// Physical address.
pub type Addr = u64;

/// Simulated time in cycles.
pub type Tick = u64;

/// A contiguous, half-open range of physical addresses `[start, start + size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AddrRange {
    /// First address of the range.
    pub start: Addr,
    /// Number of bytes covered.
    pub size: u64,
}

impl AddrRange {
    /// Creates a new address range.
    pub fn new(start: Addr, size: u64) -> Self {
        Self { start, size }
    }

    /// Returns the exclusive end address of the range.
    pub fn end(&self) -> Addr {
        self.start.saturating_add(self.size)
    }

    /// Returns `true` if every byte of `[addr, addr + len)` lies in the range.
    pub fn contains(&self, addr: Addr, len: u64) -> bool {
        addr >= self.start && addr.saturating_add(len) <= self.end()
    }
}

impl fmt::Display for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x} - {:#010x}", self.start, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds_are_half_open() {
        let range = AddrRange::new(0x1000, 0x100);
        assert!(range.contains(0x1000, 1));
        assert!(range.contains(0x10f8, 8));
        assert!(!range.contains(0x10f9, 8));
        assert!(!range.contains(0x0fff, 1));
        assert_eq!(range.end(), 0x1100);
    }
}
