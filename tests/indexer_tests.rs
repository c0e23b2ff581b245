//! Integration tests for the Bunker address indexer.

use bunker_cache::cache::indexer::{self, BunkerIndexer, Decoded};
use bunker_cache::common::ConfigError;
use proptest::prelude::*;
use rstest::rstest;

const KB: u64 = 1024;

/// Creates the 128kB direct-mapped geometry used throughout the tests.
fn direct_mapped() -> BunkerIndexer {
    BunkerIndexer::new(128 * KB, 64, 1, 1, 48).unwrap()
}

// ══════════════════════════════════════════════════════════
// Geometry
// ══════════════════════════════════════════════════════════

/// Tests the derived index count for a radix-grouped cache.
#[test]
fn test_indices_follow_radix() {
    let ix = BunkerIndexer::new(1024 * KB, 64, 4, 3, 48).unwrap();
    assert_eq!(ix.blocks(), 16384);
    assert_eq!(ix.indices(), 4096);
    assert_eq!(ix.radix(), 4);
}

/// Tests that offsets are the low address bits.
#[test]
fn test_offset_is_low_bits() {
    let ix = direct_mapped();
    assert_eq!(ix.decode(0x1234).offset, 0x34);
    assert_eq!(ix.decode(0x1240).offset, 0);
}

/// Tests that addresses one cache size apart share an index.
#[test]
fn test_aliasing_addresses_share_index() {
    let ix = direct_mapped();
    let a = ix.decode(0x1000);
    let b = ix.decode(0x1000 + 128 * KB);
    assert_eq!(a.index, b.index);
    assert_ne!(a.tag, b.tag);
}

/// Tests the free-standing decode entry point.
#[test]
fn test_free_decode_matches_indexer() {
    let d = indexer::decode(0x21008, 128 * KB, 64, 1, 1).unwrap();
    assert_eq!(d, direct_mapped().decode(0x21008));
    assert_eq!(
        d,
        Decoded {
            tag: 1,
            index: 0x40,
            offset: 8
        }
    );
}

// ══════════════════════════════════════════════════════════
// Validation
// ══════════════════════════════════════════════════════════

/// Tests that every invalid geometry is rejected with the matching error.
#[rstest]
#[case(4096, 48, 1, 1, ConfigError::InvalidBlockSize(48))]
#[case(4096, 0, 1, 1, ConfigError::InvalidBlockSize(0))]
#[case(0, 64, 1, 1, ConfigError::InvalidCacheSize { size: 0, block_size: 64 })]
#[case(4000, 64, 1, 1, ConfigError::InvalidCacheSize { size: 4000, block_size: 64 })]
#[case(4096, 64, 0, 1, ConfigError::InvalidRadix { radix: 0, blocks: 64 })]
#[case(4096, 64, 3, 1, ConfigError::InvalidRadix { radix: 3, blocks: 64 })]
#[case(4096, 64, 1, 0, ConfigError::InvalidStride { stride: 0, indices: 64 })]
#[case(4096, 64, 1, 4, ConfigError::InvalidStride { stride: 4, indices: 64 })]
fn test_invalid_geometry(
    #[case] size: u64,
    #[case] block_size: usize,
    #[case] radix: usize,
    #[case] stride: usize,
    #[case] expected: ConfigError,
) {
    assert_eq!(
        BunkerIndexer::new(size, block_size, radix, stride, 48),
        Err(expected)
    );
}

/// Tests that a cache larger than the address space is rejected.
#[test]
fn test_cache_exceeding_address_space() {
    assert_eq!(
        BunkerIndexer::new(128 * KB, 64, 1, 1, 16),
        Err(ConfigError::ExceedsAddressSpace {
            size: 128 * KB,
            address_bits: 16
        })
    );
    assert_eq!(
        BunkerIndexer::new(128 * KB, 64, 1, 1, 65),
        Err(ConfigError::InvalidAddressBits(65))
    );
}

/// Tests that a single index accepts any stride.
#[test]
fn test_fully_associative_accepts_any_stride() {
    let ix = BunkerIndexer::new(4096, 64, 64, 8, 48).unwrap();
    assert_eq!(ix.indices(), 1);
    assert_eq!(ix.decode(0xdead_beef).index, 0);
}

// ══════════════════════════════════════════════════════════
// Properties
// ══════════════════════════════════════════════════════════

fn geometry() -> impl Strategy<Value = BunkerIndexer> {
    (6u32..=7, 0u32..=6, 0u32..=3, 0usize..8).prop_map(|(bs_log, idx_log, radix_log, k)| {
        let block_size = 1usize << bs_log;
        let radix = 1usize << radix_log;
        let indices = 1usize << idx_log;
        let stride = 2 * k + 1;
        let size = (block_size * radix * indices) as u64;
        BunkerIndexer::new(size, block_size, radix, stride, 48).unwrap()
    })
}

proptest! {
    /// Decoding is a pure function of the address.
    #[test]
    fn prop_decode_is_deterministic(ix in geometry(), addr in 0u64..(1 << 40)) {
        prop_assert_eq!(ix.decode(addr), ix.decode(addr));
    }

    /// Fields stay within their ranges.
    #[test]
    fn prop_fields_in_range(ix in geometry(), addr in 0u64..(1 << 40)) {
        let d = ix.decode(addr);
        prop_assert!(d.index < ix.indices());
        prop_assert!(d.offset < ix.block_size());
    }

    /// Encoding the tag and index rebuilds the block address.
    #[test]
    fn prop_encode_inverts_decode(ix in geometry(), addr in 0u64..(1 << 40)) {
        let d = ix.decode(addr);
        prop_assert_eq!(ix.encode(d.tag, d.index), ix.block_addr(addr));
    }

    /// With radix 1 and stride 1 the mapping is plain direct-mapped indexing.
    #[test]
    fn prop_degenerates_to_direct_mapped(idx_log in 0u32..12, addr in any::<u64>()) {
        let blocks = 1u64 << idx_log;
        let ix = BunkerIndexer::new(blocks * 64, 64, 1, 1, 64).unwrap();
        let d = ix.decode(addr);
        prop_assert_eq!(d.offset as u64, addr % 64);
        prop_assert_eq!(d.index as u64, (addr / 64) % blocks);
        prop_assert_eq!(d.tag, addr / 64 / blocks);
    }
}
