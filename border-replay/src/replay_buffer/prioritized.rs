//! Replay buffer with prioritized sampling.
use super::{encode_sample, nstep_accumulator, ReplayBufferConfig};
use crate::{
    base::{ExperienceBufferBase, ReplayBufferBase},
    error::{ReplayBufferError, Result},
    nstep::NstepAccumulator,
    sampler::{check_finite, IwScheduler, Priorities, PrioritizedSampler},
    storage::{Element, RingStore, TransitionBatch, TransitionRef},
};
use log::info;

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Replay buffer sampling transitions in proportion to their priorities.
///
/// Newly added transitions get the largest priority seen so far, so that each
/// of them is likely to be sampled at least once. After an optimization step,
/// the priorities of the sampled transitions are replaced by their TD errors.
///
/// ```mermaid
/// graph LR
///     A[add]-->|transitions|B[RingStore]
///     A -->|max priority|C[PrioritizedSampler]
///     C -->|slots, weights|D[batch]
///     B -->|gather, n-step|D
///     D -->|TD errors|E[update_priority]
///     E -->|priorities|C
///     E -->|step|F[IwScheduler]
///     F -->|beta|D
/// ```
///
/// [`ReplayBufferBase::batch`] takes the exponent of importance weights from
/// an [`IwScheduler`], advanced by each call of
/// [`ReplayBufferBase::update_priority`]. [`PrioritizedReplayBuffer::sample`]
/// takes it as an argument.
pub struct PrioritizedReplayBuffer<O: Element, A: Element> {
    store: RingStore<'static, O, A>,
    sampler: PrioritizedSampler,
    iw_scheduler: IwScheduler,
    nstep: Option<NstepAccumulator>,
}

impl<O: Element, A: Element> PrioritizedReplayBuffer<O, A> {
    /// Creates a prioritized replay buffer.
    ///
    /// [`PerConfig::default`](super::PerConfig::default) is used if
    /// `config.per_config` is `None`.
    pub fn new(config: &ReplayBufferConfig) -> Result<Self> {
        config.validate()?;
        let per_config = config.per_config.clone().unwrap_or_default();
        let store = RingStore::new(
            config.capacity,
            config.obs_dim,
            config.act_dim,
            config.reward_dim,
            config.concurrency,
        )?;
        let sampler =
            PrioritizedSampler::new(store.capacity(), &per_config, config.concurrency, config.seed)?;
        let nstep = nstep_accumulator(config)?;
        info!(
            "Construct prioritized replay buffer with capacity = {}, alpha = {}, eps = {}, nstep = {:?}",
            store.capacity(),
            per_config.alpha,
            per_config.eps,
            nstep.as_ref().map(|n| n.nstep())
        );

        Ok(Self {
            store,
            sampler,
            iw_scheduler: IwScheduler::from_config(&per_config)?,
            nstep,
        })
    }

    /// Stores transitions at the maximum priority and returns the slot of
    /// the first one.
    pub fn add(&mut self, tr: TransitionRef<'_, O, A>) -> Result<usize> {
        let start = self.store.store(tr)?;
        self.sampler
            .set_priorities(start, Priorities::Max(tr.len()), self.store.capacity())?;
        Ok(start)
    }

    /// Stores transitions with explicit priorities and returns the slot of
    /// the first one.
    pub fn add_with_priorities(
        &mut self,
        tr: TransitionRef<'_, O, A>,
        priorities: &[f32],
    ) -> Result<usize> {
        if tr.len() != priorities.len() {
            return Err(ReplayBufferError::LengthMismatch {
                indices: tr.len(),
                priorities: priorities.len(),
            });
        }
        check_finite(priorities)?;

        let start = self.store.store(tr)?;
        self.sampler.set_priorities(
            start,
            Priorities::Explicit(priorities),
            self.store.capacity(),
        )?;
        Ok(start)
    }

    /// Samples `batch_size` transitions with importance weights computed
    /// with exponent `beta`.
    pub fn sample(&mut self, batch_size: usize, beta: f32) -> Result<TransitionBatch<O, A>> {
        let (ixs, weight) = self
            .sampler
            .sample(batch_size, beta, self.store.stored_size())?;
        encode_sample(&self.store, self.nstep.as_ref(), &ixs, Some(weight))
    }

    /// Replaces the priorities of the given slots.
    ///
    /// The schedule of beta is not advanced.
    pub fn update_priorities(&mut self, ixs: &[usize], priorities: &[f32]) -> Result<()> {
        self.sampler.update_priorities(ixs, priorities)
    }

    /// Current exponent of importance weights used by
    /// [`ReplayBufferBase::batch`].
    pub fn beta(&self) -> f32 {
        self.iw_scheduler.beta()
    }

    /// Largest priority seen so far.
    pub fn max_priority(&self) -> f32 {
        self.sampler.max_priority()
    }

    /// Sets the offset added to priorities from now on.
    pub fn set_eps(&mut self, eps: f32) -> Result<()> {
        self.sampler.set_eps(eps)
    }

    /// The underlying ring store.
    pub fn store(&self) -> &RingStore<'static, O, A> {
        &self.store
    }

    /// The underlying sampler.
    pub fn sampler(&self) -> &PrioritizedSampler {
        &self.sampler
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }
}

impl<O: Element, A: Element> ExperienceBufferBase for PrioritizedReplayBuffer<O, A> {
    type Item = TransitionBatch<O, A>;

    fn push(&mut self, tr: Self::Item) -> anyhow::Result<()> {
        self.add(tr.view())?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.store.stored_size()
    }
}

impl<O: Element, A: Element> ReplayBufferBase for PrioritizedReplayBuffer<O, A> {
    type Config = ReplayBufferConfig;
    type Batch = TransitionBatch<O, A>;

    fn build(config: &Self::Config) -> anyhow::Result<Self> {
        Ok(Self::new(config)?)
    }

    fn batch(&mut self, size: usize) -> anyhow::Result<Self::Batch> {
        let beta = self.iw_scheduler.beta();
        Ok(self.sample(size, beta)?)
    }

    /// Updates the priorities with the TD errors and advances the schedule of beta.
    ///
    /// `ixs` and `td_err` must be both `Some` or both `None`; the latter does nothing.
    fn update_priority(
        &mut self,
        ixs: &Option<Vec<usize>>,
        td_err: &Option<Vec<f32>>,
    ) -> anyhow::Result<()> {
        match (ixs, td_err) {
            (Some(ixs), Some(td_err)) => {
                self.sampler.update_priorities(ixs, td_err)?;
                self.iw_scheduler.step();
                Ok(())
            }
            (None, None) => Ok(()),
            _ => Err(ReplayBufferError::ContractViolation(
                "ixs and td_err must be given together".to_string(),
            )
            .into()),
        }
    }

    /// Removes all transitions and priorities and restarts the schedule of beta.
    fn clear(&mut self) {
        self.store.clear();
        self.sampler.clear();
        self.iw_scheduler.reset();
    }
}
