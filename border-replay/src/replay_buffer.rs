//! Replay buffers combining a ring store with a sampler.
//!
//! * [`ReplayBuffer`] samples stored transitions uniformly.
//! * [`PrioritizedReplayBuffer`] samples them in proportion to their
//!   priorities and returns importance weights.
//!
//! Both optionally replace sampled rewards with n-step returns, configured by
//! [`NstepConfig`].
mod config;
mod prioritized;
mod uniform;
use crate::{
    error::Result,
    nstep::{NstepAccumulator, NstepReturns},
    storage::{Element, RingStore, TransitionBatch},
};
pub use config::{NstepConfig, PerConfig, ReplayBufferConfig};
pub use prioritized::PrioritizedReplayBuffer;
pub use uniform::ReplayBuffer;

fn nstep_accumulator(config: &ReplayBufferConfig) -> Result<Option<NstepAccumulator>> {
    config
        .nstep_config
        .as_ref()
        .map(|c| NstepAccumulator::new(c.nstep, c.gamma))
        .transpose()
}

/// Gathers the sampled slots into a batch, with n-step returns if enabled.
fn encode_sample<O: Element, A: Element>(
    store: &RingStore<'_, O, A>,
    nstep: Option<&NstepAccumulator>,
    ixs: &[usize],
    weight: Option<Vec<f32>>,
) -> Result<TransitionBatch<O, A>> {
    let mut batch = store.gather(ixs)?;
    if let Some(nstep) = nstep {
        let NstepReturns {
            discounts,
            returns,
            next_obs,
            is_done,
        } = nstep.compute(store, ixs)?;
        batch.reward = returns;
        batch.next_obs = next_obs;
        batch.is_done = is_done;
        batch.discount = Some(discounts);
    }
    batch.weight = weight;
    Ok(batch)
}
