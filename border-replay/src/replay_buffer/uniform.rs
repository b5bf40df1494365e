//! Replay buffer with uniform sampling.
use super::{encode_sample, nstep_accumulator, ReplayBufferConfig};
use crate::{
    base::{ExperienceBufferBase, ReplayBufferBase},
    error::Result,
    nstep::NstepAccumulator,
    sampler::UniformSampler,
    storage::{Element, RingStore, SharedWriter, TransitionBatch, TransitionRef},
};
use log::{info, trace};

/// Replay buffer sampling transitions uniformly.
///
/// ```rust
/// use border_replay::{ReplayBuffer, ReplayBufferBase, ReplayBufferConfig, TransitionBatch};
///
/// let config = ReplayBufferConfig::default().capacity(4).obs_dim(2);
/// let mut buffer = ReplayBuffer::<f32, i64>::build(&config).unwrap();
/// let tr = TransitionBatch::new(vec![0.0, 1.0], vec![1], vec![1.0], vec![1.0, 2.0], vec![0]);
/// buffer.add(tr.view()).unwrap();
///
/// let batch = buffer.batch(8).unwrap();
/// assert_eq!(batch.len(), 8);
/// assert!(batch.weight.is_none());
/// ```
pub struct ReplayBuffer<O: Element, A: Element> {
    store: RingStore<'static, O, A>,
    sampler: UniformSampler,
    nstep: Option<NstepAccumulator>,
}

impl<O: Element, A: Element> ReplayBuffer<O, A> {
    /// Creates a replay buffer.
    pub fn new(config: &ReplayBufferConfig) -> Result<Self> {
        config.validate()?;
        let store = RingStore::new(
            config.capacity,
            config.obs_dim,
            config.act_dim,
            config.reward_dim,
            config.concurrency,
        )?;
        let nstep = nstep_accumulator(config)?;
        info!(
            "Construct replay buffer with capacity = {}, nstep = {:?}",
            store.capacity(),
            nstep.as_ref().map(|n| n.nstep())
        );

        Ok(Self {
            store,
            sampler: UniformSampler::new(config.seed),
            nstep,
        })
    }

    /// Stores transitions and returns the slot of the first one.
    pub fn add(&mut self, tr: TransitionRef<'_, O, A>) -> Result<usize> {
        self.store.store(tr)
    }

    /// Returns a handle storing transitions from many threads.
    ///
    /// Only available with [`ConcurrencyMode::MultiWriter`](crate::ConcurrencyMode::MultiWriter).
    pub fn shared_writer(&mut self) -> Result<SharedWriter<'_, 'static, O, A>> {
        self.store.shared_writer()
    }

    /// Samples `batch_size` transitions with replacement.
    pub fn sample(&mut self, batch_size: usize) -> Result<TransitionBatch<O, A>> {
        let stored_size = self.store.stored_size();
        trace!("Sample {} of {} transitions", batch_size, stored_size);
        let ixs = self.sampler.sample(batch_size, stored_size)?;
        encode_sample(&self.store, self.nstep.as_ref(), &ixs, None)
    }

    /// The underlying ring store.
    pub fn store(&self) -> &RingStore<'static, O, A> {
        &self.store
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }
}

impl<O: Element, A: Element> ExperienceBufferBase for ReplayBuffer<O, A> {
    type Item = TransitionBatch<O, A>;

    fn push(&mut self, tr: Self::Item) -> anyhow::Result<()> {
        self.add(tr.view())?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.store.stored_size()
    }
}

impl<O: Element, A: Element> ReplayBufferBase for ReplayBuffer<O, A> {
    type Config = ReplayBufferConfig;
    type Batch = TransitionBatch<O, A>;

    fn build(config: &Self::Config) -> anyhow::Result<Self> {
        Ok(Self::new(config)?)
    }

    fn batch(&mut self, size: usize) -> anyhow::Result<Self::Batch> {
        Ok(self.sample(size)?)
    }

    /// Does nothing, transitions have no priority.
    fn update_priority(
        &mut self,
        _ixs: &Option<Vec<usize>>,
        _td_err: &Option<Vec<f32>>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn clear(&mut self) {
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ReplayBufferError, NstepConfig};

    fn transitions(rewards: &[f32], dones: &[i8]) -> TransitionBatch<f32, i64> {
        let n = rewards.len();
        TransitionBatch::new(
            (0..n).map(|i| i as f32).collect(),
            vec![0; n],
            rewards.to_vec(),
            (0..n).map(|i| (i + 1) as f32).collect(),
            dones.to_vec(),
        )
    }

    #[test]
    fn test_uniform_batch() -> anyhow::Result<()> {
        let config = ReplayBufferConfig::default().capacity(8);
        let mut buffer = ReplayBuffer::<f32, i64>::build(&config)?;
        assert!(buffer.is_empty());
        assert!(matches!(
            buffer.sample(4),
            Err(ReplayBufferError::EmptyBuffer)
        ));

        buffer.push(transitions(&[1.0, 2.0, 3.0], &[0, 0, 1]))?;
        assert_eq!(buffer.len(), 3);

        let batch = buffer.batch(32)?;
        assert_eq!(batch.len(), 32);
        assert!(batch.weight.is_none());
        assert!(batch.discount.is_none());
        let ixs = batch.ix_sample.as_ref().unwrap();
        for (k, &ix) in ixs.iter().enumerate() {
            assert!(ix < 3);
            assert_eq!(batch.reward[k], (ix + 1) as f32);
            assert_eq!(batch.obs[k], ix as f32);
        }

        buffer.clear();
        assert_eq!(buffer.len(), 0);
        Ok(())
    }

    #[test]
    fn test_nstep_batch() -> anyhow::Result<()> {
        let config = ReplayBufferConfig::default()
            .capacity(8)
            .nstep_config(Some(NstepConfig::default().nstep(2).gamma(0.5)));
        let mut buffer = ReplayBuffer::<f32, i64>::build(&config)?;
        buffer.push(transitions(&[1.0, 2.0, 3.0, 4.0], &[0, 1, 0, 0]))?;

        let batch = buffer.batch(64)?;
        let discount = batch.discount.as_ref().unwrap();
        for (k, &ix) in batch.ix_sample.as_ref().unwrap().iter().enumerate() {
            let (ret, d, next_obs, done) = match ix {
                0 => (2.0, 0.25, 2.0, 1),
                1 => (2.0, 0.5, 2.0, 1),
                2 => (5.0, 0.25, 4.0, 0),
                _ => (4.0, 0.5, 4.0, 0),
            };
            assert_eq!(batch.reward[k], ret);
            assert_eq!(discount[k], d);
            assert_eq!(batch.next_obs[k], next_obs);
            assert_eq!(batch.is_done[k], done);
        }
        Ok(())
    }

    #[test]
    fn test_update_priority_is_noop() -> anyhow::Result<()> {
        let mut buffer = ReplayBuffer::<f32, i64>::build(&ReplayBufferConfig::default())?;
        buffer.update_priority(&Some(vec![0]), &Some(vec![1.0]))?;
        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        let config = ReplayBufferConfig::default().obs_dim(0);
        assert!(ReplayBuffer::<f32, i64>::build(&config).is_err());
    }
}
