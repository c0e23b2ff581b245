use super::ReplacementPolicy;

/// Uniformly random victim selection, reproducible from a seed.
pub struct RandomPolicy {
    ways: usize,
    rng: fastrand::Rng,
}

impl RandomPolicy {
    /// Creates a policy choosing among `ways` slots.
    pub fn new(ways: usize, seed: u64) -> Self {
        Self {
            ways,
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl ReplacementPolicy for RandomPolicy {
    fn update(&mut self, _set: usize, _way: usize) {}

    fn get_victim(&mut self, _set: usize) -> usize {
        self.rng.usize(..self.ways)
    }
}
