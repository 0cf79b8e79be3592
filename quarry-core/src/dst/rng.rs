//! DeterministicRng - Seeded randomness
//!
//! TigerStyle: All randomness in a simulated run flows from one seed.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// ChaCha-backed RNG, reproducible from its seed.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    seed: u64,
    inner: ChaCha8Rng,
}

impl DeterministicRng {
    /// Create from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Create from OS entropy, for production use.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    /// Seed this RNG was created from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Next random `u64`.
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// True with probability `p`.
    ///
    /// # Panics
    /// Panics if `p` is outside `0.0..=1.0`.
    pub fn next_bool(&mut self, p: f64) -> bool {
        // Precondition
        assert!((0.0..=1.0).contains(&p), "probability {p} out of range");
        self.inner.gen_bool(p)
    }

    /// `count` distinct elements of `items`, in random order.
    ///
    /// # Panics
    /// Panics if `count` exceeds `items.len()`.
    pub fn sample<T: Copy>(&mut self, items: &[T], count: usize) -> Vec<T> {
        // Precondition
        assert!(
            count <= items.len(),
            "cannot sample {count} from {} items",
            items.len()
        );
        items.choose_multiple(&mut self.inner, count).copied().collect()
    }
}
