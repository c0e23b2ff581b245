//! Bunker Address Indexer.
//!
//! Splits a physical address into `(tag, index, offset)` for a cache built
//! from `blocks = size / block_size` lines grouped into
//! `indices = blocks / radix` indices of `radix` slots each.
//!
//! Consecutive blocks are interleaved across the index space by `stride`:
//!
//! ```text
//! block  = addr / block_size
//! offset = addr % block_size
//! index  = ((block mod indices) * stride) mod indices
//! tag    = block / indices
//! ```
//!
//! Because `stride` is coprime with `indices` the index function is a
//! permutation of `block mod indices`, so `(tag, index)` identifies a block
//! uniquely and `encode` can invert it. With `radix = 1` and `stride = 1`
//! this is plain direct-mapped indexing.

use crate::common::{Addr, ConfigError};

/// The decoded form of an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Decoded {
    /// Block identity within its index.
    pub tag: u64,
    /// Index in `0..indices`.
    pub index: usize,
    /// Byte offset in `0..block_size`.
    pub offset: usize,
}

/// Validated cache geometry and its address mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BunkerIndexer {
    capacity: u64,
    block_size: usize,
    block_shift: u32,
    blocks: usize,
    indices: usize,
    radix: usize,
    stride: usize,
    stride_inv: usize,
}

impl BunkerIndexer {
    /// Validates a geometry and precomputes the mapping.
    ///
    /// # Arguments
    ///
    /// * `cache_size` - Capacity in bytes.
    /// * `block_size` - Line size in bytes; a power of two.
    /// * `radix` - Slots per index; must divide the number of blocks.
    /// * `stride` - Interleave distance; must be coprime with the index count.
    /// * `address_bits` - Width of the physical address space.
    pub fn new(
        cache_size: u64,
        block_size: usize,
        radix: usize,
        stride: usize,
        address_bits: u32,
    ) -> Result<Self, ConfigError> {
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(ConfigError::InvalidBlockSize(block_size));
        }
        if !(1..=64).contains(&address_bits) {
            return Err(ConfigError::InvalidAddressBits(address_bits));
        }
        if cache_size == 0 || cache_size % block_size as u64 != 0 {
            return Err(ConfigError::InvalidCacheSize {
                size: cache_size,
                block_size,
            });
        }
        if address_bits < 64 && cache_size > 1u64 << address_bits {
            return Err(ConfigError::ExceedsAddressSpace {
                size: cache_size,
                address_bits,
            });
        }

        let blocks = (cache_size / block_size as u64) as usize;
        if radix == 0 || blocks % radix != 0 {
            return Err(ConfigError::InvalidRadix { radix, blocks });
        }

        let indices = blocks / radix;
        if stride == 0 || gcd(stride as u64, indices as u64) != 1 {
            return Err(ConfigError::InvalidStride { stride, indices });
        }

        Ok(Self {
            capacity: cache_size,
            block_size,
            block_shift: block_size.trailing_zeros(),
            blocks,
            indices,
            radix,
            stride,
            stride_inv: mod_inverse(stride as u64 % indices as u64, indices as u64) as usize,
        })
    }

    /// Splits `addr` into tag, index and offset.
    pub fn decode(&self, addr: Addr) -> Decoded {
        let block = addr >> self.block_shift;
        let offset = (addr & (self.block_size as u64 - 1)) as usize;
        let indices = self.indices as u64;
        let residue = block % indices;
        let index = (residue as u128 * self.stride as u128 % indices as u128) as usize;
        Decoded {
            tag: block / indices,
            index,
            offset,
        }
    }

    /// Rebuilds the block-aligned address of `(tag, index)`.
    pub fn encode(&self, tag: u64, index: usize) -> Addr {
        let indices = self.indices as u64;
        let residue = (index as u128 * self.stride_inv as u128 % indices as u128) as u64;
        (tag * indices + residue) << self.block_shift
    }

    /// Rounds `addr` down to its block.
    pub fn block_addr(&self, addr: Addr) -> Addr {
        addr & !(self.block_size as u64 - 1)
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Line size in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Total number of lines.
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Number of indices.
    pub fn indices(&self) -> usize {
        self.indices
    }

    /// Slots per index.
    pub fn radix(&self) -> usize {
        self.radix
    }

    /// Interleave distance.
    pub fn stride(&self) -> usize {
        self.stride
    }
}

/// Decodes a single address without keeping the geometry around.
pub fn decode(
    addr: Addr,
    cache_size: u64,
    block_size: usize,
    radix: usize,
    stride: usize,
) -> Result<Decoded, ConfigError> {
    BunkerIndexer::new(cache_size, block_size, radix, stride, 64).map(|ix| ix.decode(addr))
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Inverse of `a` modulo `m` for coprime `a` and `m`.
fn mod_inverse(a: u64, m: u64) -> u64 {
    if m == 1 {
        return 0;
    }
    let (mut old_r, mut r) = (a as i128, m as i128);
    let (mut old_s, mut s) = (1i128, 0i128);
    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }
    old_s.rem_euclid(m as i128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_permutes_indices() {
        let ix = BunkerIndexer::new(8 * 64, 64, 1, 3, 48).unwrap();
        let mut seen: Vec<usize> = (0..8).map(|b| ix.decode(b * 64).index).collect();
        assert_eq!(seen, vec![0, 3, 6, 1, 4, 7, 2, 5]);
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn inverse_of_stride() {
        assert_eq!(mod_inverse(3, 8), 3);
        assert_eq!(mod_inverse(7, 16), 7);
        assert_eq!(mod_inverse(1, 1), 0);
    }

    #[test]
    fn radix_groups_blocks_into_fewer_indices() {
        let ix = BunkerIndexer::new(16 * 64, 64, 4, 1, 48).unwrap();
        assert_eq!(ix.indices(), 4);
        let d = ix.decode(5 * 64 + 7);
        assert_eq!(d, Decoded { tag: 1, index: 1, offset: 7 });
        assert_eq!(ix.encode(d.tag, d.index), 5 * 64);
    }
}
