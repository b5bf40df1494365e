//! Configuration of replay buffers.
use crate::{
    error::{ReplayBufferError, Result},
    sampler::{WeightNormalizer, WeightNormalizer::All},
    storage::ConcurrencyMode,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of prioritized experience replay (PER).
///
/// Priorities $p_i$ are turned into sampling mass $(|p_i| + \epsilon)^\alpha$.
/// The exponent of importance weights is scheduled linearly from `beta_0` to
/// `beta_final` over `n_opts_final` priority updates.
///
/// ```rust
/// use border_replay::{PerConfig, WeightNormalizer};
///
/// let config = PerConfig::default()
///     .alpha(0.6)
///     .eps(1e-4)
///     .beta_0(0.4)
///     .beta_final(1.0)
///     .n_opts_final(500_000)
///     .normalize(WeightNormalizer::All);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerConfig {
    /// Exponent of prioritization, 0 for uniform sampling.
    pub alpha: f32,

    /// Offset added to the absolute value of priorities, positive.
    pub eps: f32,

    /// Initial value of the exponent of importance weights.
    pub beta_0: f32,

    /// Final value of the exponent of importance weights.
    pub beta_final: f32,

    /// Number of optimization steps after which `beta` reaches `beta_final`.
    pub n_opts_final: usize,

    /// Normalization of importance weights.
    pub normalize: WeightNormalizer,
}

impl Default for PerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            eps: 1e-4,
            beta_0: 0.4,
            beta_final: 1.0,
            n_opts_final: 500_000,
            normalize: All,
        }
    }
}

impl PerConfig {
    /// Sets the exponent of prioritization.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the offset added to priorities.
    pub fn eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    /// Sets the initial value of beta.
    pub fn beta_0(mut self, beta_0: f32) -> Self {
        self.beta_0 = beta_0;
        self
    }

    /// Sets the final value of beta.
    pub fn beta_final(mut self, beta_final: f32) -> Self {
        self.beta_final = beta_final;
        self
    }

    /// Sets the number of optimization steps when beta reaches its final value.
    pub fn n_opts_final(mut self, n_opts_final: usize) -> Self {
        self.n_opts_final = n_opts_final;
        self
    }

    /// Sets the normalization of importance weights.
    pub fn normalize(mut self, normalize: WeightNormalizer) -> Self {
        self.normalize = normalize;
        self
    }

    /// Checks the values of the parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(ReplayBufferError::Configuration(format!(
                "alpha must be non-negative, got {}",
                self.alpha
            )));
        }
        if !(self.eps.is_finite() && self.eps > 0.0) {
            return Err(ReplayBufferError::Configuration(format!(
                "eps must be positive, got {}",
                self.eps
            )));
        }
        let valid_beta = |beta: f32| beta.is_finite() && beta >= 0.0;
        if !(valid_beta(self.beta_0) && valid_beta(self.beta_final)) {
            return Err(ReplayBufferError::Configuration(format!(
                "beta must be finite and non-negative, got beta_0 = {}, beta_final = {}",
                self.beta_0, self.beta_final
            )));
        }
        Ok(())
    }
}

/// Configuration of n-step returns.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct NstepConfig {
    /// Maximum number of accumulated transitions, at least 1.
    pub nstep: usize,

    /// Discount factor in `[0, 1]`.
    pub gamma: f32,
}

impl Default for NstepConfig {
    fn default() -> Self {
        Self {
            nstep: 3,
            gamma: 0.99,
        }
    }
}

impl NstepConfig {
    /// Sets the number of steps.
    pub fn nstep(mut self, nstep: usize) -> Self {
        self.nstep = nstep;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Checks the values of the parameters.
    pub fn validate(&self) -> Result<()> {
        if self.nstep == 0 {
            return Err(ReplayBufferError::Configuration(
                "nstep must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ReplayBufferError::Configuration(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        Ok(())
    }
}

/// Configuration of [`ReplayBuffer`](super::ReplayBuffer) and
/// [`PrioritizedReplayBuffer`](super::PrioritizedReplayBuffer).
///
/// `per_config` is used only by the prioritized buffer, which falls back to
/// [`PerConfig::default`] when it is `None`.
///
/// ```rust
/// use border_replay::{NstepConfig, PerConfig, ReplayBufferConfig};
///
/// let config = ReplayBufferConfig::default()
///     .capacity(1 << 16)
///     .obs_dim(4)
///     .act_dim(1)
///     .seed(42)
///     .per_config(Some(PerConfig::default()))
///     .nstep_config(Some(NstepConfig::default().nstep(3).gamma(0.99)));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ReplayBufferConfig {
    /// Requested number of slots, rounded up to a power of two.
    pub capacity: usize,

    /// Number of scalars in an observation.
    pub obs_dim: usize,

    /// Number of scalars in an action.
    pub act_dim: usize,

    /// Number of scalars in a reward.
    pub reward_dim: usize,

    /// Seed of the random number generator for sampling.
    pub seed: u64,

    /// How the write counters and the maximum priority are updated.
    pub concurrency: ConcurrencyMode,

    /// Configuration of prioritized experience replay.
    pub per_config: Option<PerConfig>,

    /// Configuration of n-step returns, 1-step transitions if `None`.
    pub nstep_config: Option<NstepConfig>,
}

impl Default for ReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 10000,
            obs_dim: 1,
            act_dim: 1,
            reward_dim: 1,
            seed: 42,
            concurrency: ConcurrencyMode::SingleWriter,
            per_config: None,
            nstep_config: None,
        }
    }
}

impl ReplayBufferConfig {
    /// Sets the capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the dimension of observations.
    pub fn obs_dim(mut self, obs_dim: usize) -> Self {
        self.obs_dim = obs_dim;
        self
    }

    /// Sets the dimension of actions.
    pub fn act_dim(mut self, act_dim: usize) -> Self {
        self.act_dim = act_dim;
        self
    }

    /// Sets the dimension of rewards.
    pub fn reward_dim(mut self, reward_dim: usize) -> Self {
        self.reward_dim = reward_dim;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the concurrency mode.
    pub fn concurrency(mut self, concurrency: ConcurrencyMode) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the configuration of prioritized experience replay.
    pub fn per_config(mut self, per_config: Option<PerConfig>) -> Self {
        self.per_config = per_config;
        self
    }

    /// Sets the configuration of n-step returns.
    pub fn nstep_config(mut self, nstep_config: Option<NstepConfig>) -> Self {
        self.nstep_config = nstep_config;
        self
    }

    /// Checks the values of the parameters.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ReplayBufferError::Configuration(
                "capacity must be at least 1".to_string(),
            ));
        }
        if self.obs_dim == 0 || self.act_dim == 0 || self.reward_dim == 0 {
            return Err(ReplayBufferError::Configuration(format!(
                "Dimensions must be positive, got obs_dim = {}, act_dim = {}, reward_dim = {}",
                self.obs_dim, self.act_dim, self.reward_dim
            )));
        }
        if let Some(per_config) = &self.per_config {
            per_config.validate()?;
        }
        if let Some(nstep_config) = &self.nstep_config {
            nstep_config.validate()?;
        }
        Ok(())
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        debug!("Load replay buffer config from {:?}", path);
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        debug!("Save replay buffer config to {:?}", path);
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
