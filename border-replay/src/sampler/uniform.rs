//! Uniform sampling of slots.
use crate::error::{ReplayBufferError, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Draws slots independently and uniformly from the stored ones.
#[derive(Debug, Clone)]
pub struct UniformSampler {
    rng: StdRng,
}

impl UniformSampler {
    /// Creates a sampler with a seeded random number generator.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draws `batch_size` slots in `[0, stored_size)` with replacement.
    pub fn sample(&mut self, batch_size: usize, stored_size: usize) -> Result<Vec<usize>> {
        if stored_size == 0 {
            return Err(ReplayBufferError::EmptyBuffer);
        }
        Ok((0..batch_size)
            .map(|_| self.rng.gen_range(0..stored_size))
            .collect())
    }
}
