//! Deterministic RNG hierarchy.
//!
//! A master seed generates deterministic sub-seeds for each
//! `(entity, stream, iteration)` tuple. Sub-seeds are derived via BLAKE3
//! hashing, independently of thread scheduling order, so agents running on the
//! Rayon pool draw the same numbers regardless of which finishes first.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Named random streams. Each pipeline stage draws from its own stream so that
/// enabling one optional step never shifts the numbers another step sees.
pub mod stream {
    pub const ENSEMBLE: &str = "probability.ensemble";
    pub const MULTIVERSE: &str = "probability.multiverse";
    pub const SELECTOR: &str = "selector";
    pub const SPECIAL: &str = "selector.special";
    pub const MONTE_CARLO: &str = "agent.monte_carlo";
}

/// Deterministic RNG hierarchy.
#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for `(entity, stream, iteration)`.
    ///
    /// Independent of derivation order: deriving "A" then "B" yields the same
    /// seeds as deriving "B" then "A".
    pub fn sub_seed(&self, entity: &str, stream: &str, iteration: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(entity.as_bytes());
        hasher.update(&[0u8]);
        hasher.update(stream.as_bytes());
        hasher.update(&iteration.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Create a seeded StdRng for `(entity, stream, iteration)`.
    pub fn rng_for(&self, entity: &str, stream: &str, iteration: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(entity, stream, iteration))
    }
}
