//! Least Recently Used (LRU) Replacement Policy.
//!
//! Every index keeps a recency stack of its slots. An access moves the slot
//! to the front; the victim is the slot at the back.

use super::ReplacementPolicy;

/// LRU Policy state.
pub struct LruPolicy {
    /// Recency stack per index. Front is most recent.
    stacks: Vec<Vec<usize>>,
}

impl LruPolicy {
    /// Creates a policy for `sets` indices of `ways` slots.
    ///
    /// # Arguments
    ///
    /// * `sets` - Number of indices.
    /// * `ways` - Slots per index (the radix).
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            stacks: (0..sets).map(|_| (0..ways).collect()).collect(),
        }
    }
}

impl ReplacementPolicy for LruPolicy {
    fn update(&mut self, set: usize, way: usize) {
        let stack = &mut self.stacks[set];
        if stack.first() == Some(&way) {
            return;
        }
        if let Some(pos) = stack.iter().position(|&w| w == way) {
            stack.remove(pos);
        }
        stack.insert(0, way);
    }

    fn get_victim(&mut self, set: usize) -> usize {
        self.stacks[set].last().copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recent_slot() {
        let mut lru = LruPolicy::new(1, 4);
        for way in [0, 1, 2, 3, 0, 2] {
            lru.update(0, way);
        }
        assert_eq!(lru.get_victim(0), 1);
    }
}
