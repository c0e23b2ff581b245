//! First In First Out (FIFO) Replacement Policy.
//!
//! Slots of an index are evicted round robin, regardless of hits.

use super::ReplacementPolicy;

/// FIFO Policy state.
pub struct FifoPolicy {
    ways: usize,
    next: Vec<usize>,
}

impl FifoPolicy {
    /// Creates a policy for `sets` indices of `ways` slots.
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            ways,
            next: vec![0; sets],
        }
    }
}

impl ReplacementPolicy for FifoPolicy {
    fn update(&mut self, _set: usize, _way: usize) {}

    fn get_victim(&mut self, set: usize) -> usize {
        let victim = self.next[set];
        self.next[set] = (victim + 1) % self.ways;
        victim
    }
}
