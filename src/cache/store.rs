//! Block Store.
//!
//! Holds the cache lines, laid out as `indices` groups of `radix` slots.
//! The indexer decides which group an address belongs to; the replacement
//! policy decides which slot of a full group is evicted. At most one valid
//! line of a group carries a given tag.

use super::indexer::{BunkerIndexer, Decoded};
use super::policies::{self, ReplacementPolicy};
use crate::common::Addr;
use crate::config;
use std::ops::Range;

/// One cache line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheLine {
    /// Block identity within its index.
    pub tag: u64,
    /// Line holds a block.
    pub valid: bool,
    /// Line differs from the next level.
    pub dirty: bool,
    /// Block contents, `block_size` bytes.
    pub data: Vec<u8>,
}

/// A line removed from the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvictedLine {
    /// Block-aligned address of the line.
    pub addr: Addr,
    /// Block contents.
    pub data: Vec<u8>,
    /// The line must be written back.
    pub dirty: bool,
}

/// Outcome of a lookup.
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// The block is resident.
    Hit(&'a CacheLine),
    /// The block is absent.
    Miss,
}

impl Lookup<'_> {
    /// Returns `true` on a hit.
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

/// Cache lines plus their replacement state.
pub struct BlockStore {
    indexer: BunkerIndexer,
    lines: Vec<CacheLine>,
    policy: Box<dyn ReplacementPolicy>,
}

impl BlockStore {
    /// Creates an empty store using the configured replacement policy.
    pub fn new(indexer: BunkerIndexer, policy: config::ReplacementPolicy, seed: u64) -> Self {
        let policy = policies::build(policy, indexer.indices(), indexer.radix(), seed);
        Self::with_policy(indexer, policy)
    }

    /// Creates an empty store with an explicit policy instance.
    pub fn with_policy(indexer: BunkerIndexer, policy: Box<dyn ReplacementPolicy>) -> Self {
        Self {
            lines: vec![CacheLine::default(); indexer.blocks()],
            indexer,
            policy,
        }
    }

    /// Returns the address mapping of the store.
    pub fn indexer(&self) -> &BunkerIndexer {
        &self.indexer
    }

    fn slots(&self, index: usize) -> Range<usize> {
        let radix = self.indexer.radix();
        index * radix..(index + 1) * radix
    }

    /// Position in `lines` of the resident block, if any.
    fn find(&self, d: &Decoded) -> Option<usize> {
        self.slots(d.index)
            .find(|&slot| self.lines[slot].valid && self.lines[slot].tag == d.tag)
    }

    fn touch(&mut self, d: &Decoded, slot: usize) {
        self.policy
            .update(d.index, slot - d.index * self.indexer.radix());
    }

    /// Looks up the block containing `addr` and updates replacement state on
    /// a hit.
    pub fn lookup(&mut self, addr: Addr) -> Lookup<'_> {
        let d = self.indexer.decode(addr);
        match self.find(&d) {
            Some(slot) => {
                self.touch(&d, slot);
                Lookup::Hit(&self.lines[slot])
            }
            None => Lookup::Miss,
        }
    }

    /// Returns `true` if the block containing `addr` is resident, without
    /// touching replacement state.
    pub fn probe(&self, addr: Addr) -> bool {
        self.find(&self.indexer.decode(addr)).is_some()
    }

    /// Returns the resident line holding `addr`.
    pub fn line(&self, addr: Addr) -> Option<&CacheLine> {
        let d = self.indexer.decode(addr);
        self.find(&d).map(|slot| &self.lines[slot])
    }

    /// Copies `buf.len()` bytes starting at `addr` out of a resident line.
    ///
    /// Returns `false` if the block is absent. The range must not cross the
    /// end of the block.
    pub fn read(&self, addr: Addr, buf: &mut [u8]) -> bool {
        let d = self.indexer.decode(addr);
        match self.find(&d) {
            Some(slot) => {
                let data = &self.lines[slot].data;
                buf.copy_from_slice(&data[d.offset..d.offset + buf.len()]);
                true
            }
            None => false,
        }
    }

    /// Stores `bytes` at `addr` in a resident line and marks it dirty.
    ///
    /// Returns `false` if the block is absent.
    pub fn write(&mut self, addr: Addr, bytes: &[u8]) -> bool {
        self.write_inner(addr, bytes, true)
    }

    /// Stores `bytes` at `addr` without changing the dirty bit.
    pub fn patch(&mut self, addr: Addr, bytes: &[u8]) -> bool {
        self.write_inner(addr, bytes, false)
    }

    fn write_inner(&mut self, addr: Addr, bytes: &[u8], mark_dirty: bool) -> bool {
        let d = self.indexer.decode(addr);
        match self.find(&d) {
            Some(slot) => {
                let line = &mut self.lines[slot];
                line.data[d.offset..d.offset + bytes.len()].copy_from_slice(bytes);
                line.dirty |= mark_dirty;
                true
            }
            None => false,
        }
    }

    /// Installs a whole block at `addr`.
    ///
    /// If the block is already resident its contents are replaced and the
    /// line stays dirty if it was. Otherwise a free slot is used, or the
    /// policy's victim is evicted and returned.
    pub fn install(&mut self, addr: Addr, data: Vec<u8>, dirty: bool) -> Option<EvictedLine> {
        let d = self.indexer.decode(addr);

        if let Some(slot) = self.find(&d) {
            let line = &mut self.lines[slot];
            line.data = data;
            line.dirty |= dirty;
            self.touch(&d, slot);
            return None;
        }

        let slots = self.slots(d.index);
        let free = slots.clone().find(|&slot| !self.lines[slot].valid);
        let slot = match free {
            Some(slot) => slot,
            None => slots.start + self.policy.get_victim(d.index),
        };

        let victim = std::mem::replace(
            &mut self.lines[slot],
            CacheLine {
                tag: d.tag,
                valid: true,
                dirty,
                data,
            },
        );
        self.touch(&d, slot);

        victim.valid.then(|| EvictedLine {
            addr: self.indexer.encode(victim.tag, d.index),
            data: victim.data,
            dirty: victim.dirty,
        })
    }

    /// Removes the block containing `addr`, returning it if it was resident.
    pub fn invalidate(&mut self, addr: Addr) -> Option<EvictedLine> {
        let d = self.indexer.decode(addr);
        let slot = self.find(&d)?;
        let line = std::mem::take(&mut self.lines[slot]);
        Some(EvictedLine {
            addr: self.indexer.encode(line.tag, d.index),
            data: line.data,
            dirty: line.dirty,
        })
    }

    /// Number of valid lines.
    pub fn valid_lines(&self) -> usize {
        self.lines.iter().filter(|l| l.valid).count()
    }

    /// Number of dirty lines.
    pub fn dirty_lines(&self) -> usize {
        self.lines.iter().filter(|l| l.valid && l.dirty).count()
    }
}
