//! SimConfig - Simulation seed
//!
//! TigerStyle: Seeds are logged so a failing run can be replayed.

use crate::constants::DST_SEED_ENV;

use super::rng::DeterministicRng;

/// Configuration for a simulated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    seed: u64,
}

impl SimConfig {
    /// Use an explicit seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// Read the seed from `DST_SEED`, or draw a fresh one.
    ///
    /// The chosen seed is logged either way.
    #[must_use]
    pub fn from_env() -> Self {
        let seed = std::env::var(DST_SEED_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(rand::random);
        tracing::info!(seed, "DST seed (replay with {}={})", DST_SEED_ENV, seed);
        Self { seed }
    }

    /// The seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A fresh RNG for this seed.
    #[must_use]
    pub fn rng(&self) -> DeterministicRng {
        DeterministicRng::new(self.seed)
    }
}
