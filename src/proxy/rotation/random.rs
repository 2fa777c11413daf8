//! Random proxy selection strategy

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Uniform random selection over a slice of candidates
pub struct RandomSelector {
    rng: Mutex<StdRng>,
}

impl RandomSelector {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    /// Pick one item, `None` when empty
    pub fn choose<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        let mut rng = self.rng.lock();
        items.choose(&mut *rng)
    }

    /// Shuffled subset of at most `count` items
    pub fn sample<T: Clone>(&self, items: &[T], count: usize) -> Vec<T> {
        let mut picked = items.to_vec();
        picked.shuffle(&mut *self.rng.lock());
        picked.truncate(count);
        picked
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}
