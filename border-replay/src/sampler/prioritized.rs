//! Proportional prioritized sampling.
//!
//! Priorities are turned into sampling mass $m_i = (|p_i| + \epsilon)^\alpha$
//! and kept in a sum tree and a min tree, so that sampling, importance
//! weights and priority updates all take $O(\log N)$ per transition.
use crate::{
    error::{check_index, ReplayBufferError, Result},
    replay_buffer::PerConfig,
    segment_tree::{Min, ReductionTree, Sum},
    storage::{ConcurrencyMode, RunningMax},
};
use log::{trace, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_PRIORITY: f32 = 1.0;

/// How importance weights are normalized.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum WeightNormalizer {
    /// Divide by the largest weight any stored transition could get, i.e.,
    /// the weight of the transition with the smallest priority.
    All,

    /// Divide by the largest weight in the sampled batch.
    Batch,
}

/// Priorities given to newly stored transitions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Priorities<'p> {
    /// `count` transitions, each at the running maximum priority.
    Max(usize),

    /// One explicit priority per transition.
    Explicit(&'p [f32]),
}

/// Sampler drawing slots in proportion to their priorities.
///
/// Tree mutations take `&mut self`: a sampler has a single writer at a time
/// whatever the [`ConcurrencyMode`]. The mode selects how the running maximum
/// priority is updated.
#[derive(Debug)]
pub struct PrioritizedSampler {
    alpha: f32,
    eps: f32,
    normalize: WeightNormalizer,
    max_priority: Box<dyn RunningMax>,
    sum: ReductionTree<f32, Sum>,
    min: ReductionTree<f32, Min>,
    rng: StdRng,
}

fn check_eps(eps: f32) -> Result<()> {
    if eps.is_finite() && eps > 0.0 {
        Ok(())
    } else {
        Err(ReplayBufferError::Configuration(format!(
            "eps must be positive, got {}",
            eps
        )))
    }
}

pub(crate) fn check_finite(priorities: &[f32]) -> Result<()> {
    match priorities.iter().find(|p| !p.is_finite()) {
        Some(p) => Err(ReplayBufferError::ContractViolation(format!(
            "Priorities must be finite, got {}",
            p
        ))),
        None => Ok(()),
    }
}

impl PrioritizedSampler {
    /// Creates a sampler over `capacity` slots, rounded up to a power of two.
    pub fn new(
        capacity: usize,
        config: &PerConfig,
        mode: ConcurrencyMode,
        seed: u64,
    ) -> Result<Self> {
        if !(config.alpha.is_finite() && config.alpha >= 0.0) {
            return Err(ReplayBufferError::Configuration(format!(
                "alpha must be non-negative, got {}",
                config.alpha
            )));
        }
        check_eps(config.eps)?;

        Ok(Self {
            alpha: config.alpha,
            eps: config.eps,
            normalize: config.normalize,
            max_priority: mode.running_max(DEFAULT_MAX_PRIORITY),
            sum: ReductionTree::new(capacity, Sum)?,
            min: ReductionTree::new(capacity, Min)?,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Number of slots covered by the trees.
    pub fn capacity(&self) -> usize {
        self.sum.len()
    }

    /// Exponent of prioritization.
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Offset added to priorities.
    pub fn eps(&self) -> f32 {
        self.eps
    }

    /// Sets the offset added to priorities from now on.
    pub fn set_eps(&mut self, eps: f32) -> Result<()> {
        check_eps(eps)?;
        self.eps = eps;
        Ok(())
    }

    /// Largest priority seen since construction or the last clear.
    pub fn max_priority(&self) -> f32 {
        self.max_priority.load()
    }

    /// Sampling mass of slot `index`.
    pub fn mass(&self, index: usize) -> Result<f32> {
        self.sum.get(index)
    }

    #[inline]
    fn to_mass(&self, p: f32) -> f32 {
        (p.abs() + self.eps).powf(self.alpha)
    }

    fn raise_max(&self, priorities: &[f32]) {
        if let Some(p) = priorities.iter().map(|p| p.abs()).reduce(f32::max) {
            self.max_priority.store_max(p);
        }
    }

    /// Sets the priorities of transitions stored from slot `start`, wrapping
    /// around `ring_capacity`.
    pub fn set_priorities(
        &mut self,
        start: usize,
        priorities: Priorities<'_>,
        ring_capacity: usize,
    ) -> Result<()> {
        match priorities {
            Priorities::Max(count) => {
                let m = self.to_mass(self.max_priority.load());
                self.sum.set_bulk(start, || m, count, ring_capacity)?;
                self.min.set_bulk(start, || m, count, ring_capacity)?;
            }
            Priorities::Explicit(ps) => {
                check_finite(ps)?;
                let masses = ps.iter().map(|&p| self.to_mass(p)).collect::<Vec<_>>();
                let mut i = 0;
                self.sum.set_bulk(
                    start,
                    || {
                        i += 1;
                        masses[i - 1]
                    },
                    masses.len(),
                    ring_capacity,
                )?;
                let mut i = 0;
                self.min.set_bulk(
                    start,
                    || {
                        i += 1;
                        masses[i - 1]
                    },
                    masses.len(),
                    ring_capacity,
                )?;
                self.raise_max(ps);
            }
        }
        Ok(())
    }

    /// Replaces the priorities of the given slots, typically with fresh TD errors.
    ///
    /// Nothing is updated if the arguments are invalid.
    pub fn update_priorities(&mut self, ixs: &[usize], priorities: &[f32]) -> Result<()> {
        if ixs.len() != priorities.len() {
            return Err(ReplayBufferError::LengthMismatch {
                indices: ixs.len(),
                priorities: priorities.len(),
            });
        }
        for &ix in ixs {
            check_index(ix, self.capacity())?;
        }
        check_finite(priorities)?;

        for (&ix, &p) in ixs.iter().zip(priorities.iter()) {
            let m = self.to_mass(p);
            self.sum.set(ix, m)?;
            self.min.set(ix, m)?;
        }
        self.raise_max(priorities);

        Ok(())
    }

    /// Samples `batch_size` slots among the first `stored_size` ones and
    /// returns them with their importance weights.
    ///
    /// The total mass is split into `batch_size` strata of equal width and
    /// one slot is drawn from each. The weight of slot $i$ is
    /// $w_i = (N m_i / \sum_j m_j)^{-\beta}$ divided by the normalizer.
    /// A negative `beta` is treated as 0.
    pub fn sample(
        &mut self,
        batch_size: usize,
        beta: f32,
        stored_size: usize,
    ) -> Result<(Vec<usize>, Vec<f32>)> {
        if stored_size == 0 {
            return Err(ReplayBufferError::EmptyBuffer);
        }
        if stored_size > self.capacity() {
            return Err(ReplayBufferError::OutOfRange {
                index: stored_size,
                bound: self.capacity() + 1,
            });
        }
        let beta = if beta >= 0.0 {
            beta
        } else {
            warn!("beta = {} is clamped to 0", beta);
            0.0
        };

        let total = self.sum.reduce(0, stored_size);
        trace!(
            "Sample {} of {} transitions, beta = {}, total mass = {}",
            batch_size,
            stored_size,
            beta,
            total
        );

        let every_range_len = total / batch_size as f32;
        let ixs = (0..batch_size)
            .map(|i| {
                let mass = (self.rng.gen::<f32>() + i as f32) * every_range_len;
                self.sum
                    .largest_region_index(|v| v <= mass, stored_size)
            })
            .collect::<Vec<_>>();
        let ws = self.weights(&ixs, beta, stored_size, total)?;

        Ok((ixs, ws))
    }

    fn weights(&self, ixs: &[usize], beta: f32, stored_size: usize, total: f32) -> Result<Vec<f32>> {
        let n = stored_size as f32;
        let inv_sum = 1.0 / total;
        let ws = ixs
            .iter()
            .map(|&ix| Ok((self.sum.get(ix)? * inv_sum * n).powf(-beta)))
            .collect::<Result<Vec<_>>>()?;

        let w_max_inv = match self.normalize {
            WeightNormalizer::All => {
                let p_min = self.min.reduce(0, stored_size) * inv_sum;
                1.0 / (p_min * n).powf(-beta)
            }
            WeightNormalizer::Batch => 1.0 / ws.iter().cloned().fold(f32::MIN_POSITIVE, f32::max),
        };

        Ok(ws.into_iter().map(|w| w * w_max_inv).collect())
    }

    /// Forgets all priorities and resets the maximum priority to 1.
    pub fn clear(&mut self) {
        self.max_priority.reset(DEFAULT_MAX_PRIORITY);
        self.sum.clear(0.0);
        self.min.clear(f32::INFINITY);
    }
}
