//! Replacement Policies.
//!
//! A policy tracks the `radix` slots of every index and names the slot to
//! evict when an index has no free slot left.

use crate::config;

/// Victim selection among the slots of one index.
pub trait ReplacementPolicy {
    /// Records an access (hit or fill) to `way` of `set`.
    fn update(&mut self, set: usize, way: usize);

    /// Returns the way of `set` to evict.
    fn get_victim(&mut self, set: usize) -> usize;
}

pub use self::fifo::FifoPolicy;
pub use self::lru::LruPolicy;
pub use self::random::RandomPolicy;

mod fifo;
mod lru;
mod random;

/// Instantiates the configured policy for `sets` indices of `ways` slots.
pub fn build(
    policy: config::ReplacementPolicy,
    sets: usize,
    ways: usize,
    seed: u64,
) -> Box<dyn ReplacementPolicy> {
    match policy {
        config::ReplacementPolicy::Lru => Box::new(LruPolicy::new(sets, ways)),
        config::ReplacementPolicy::Fifo => Box::new(FifoPolicy::new(sets, ways)),
        config::ReplacementPolicy::Random => Box::new(RandomPolicy::new(ways, seed)),
    }
}
