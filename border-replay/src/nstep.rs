//! N-step discounted returns computed at sampling time.
use crate::{
    error::{check_index, ReplayBufferError, Result},
    storage::{Element, RingStore},
};

/// N-step returns of sampled transitions.
#[derive(Debug, Clone, PartialEq)]
pub struct NstepReturns<O> {
    /// $\gamma^k$ for each sample, `k` the number of accumulated transitions.
    pub discounts: Vec<f32>,

    /// Discounted sums of rewards, `reward_dim` values per sample.
    pub returns: Vec<f32>,

    /// Next observations of the last accumulated transitions, `obs_dim`
    /// values per sample.
    pub next_obs: Vec<O>,

    /// Done flags of the last accumulated transitions.
    pub is_done: Vec<i8>,
}

/// Accumulates rewards of up to `nstep` consecutive transitions.
///
/// Starting at a sampled slot, the walk goes forward through the ring and
/// stops after `nstep` transitions, after a transition ending an episode, or
/// before the write cursor, whichever comes first.
#[derive(Debug, Clone, PartialEq)]
pub struct NstepAccumulator {
    nstep: usize,
    gamma: f32,
}

impl NstepAccumulator {
    /// Creates an accumulator over `nstep` transitions discounted by `gamma`.
    pub fn new(nstep: usize, gamma: f32) -> Result<Self> {
        if nstep == 0 {
            return Err(ReplayBufferError::Configuration(
                "nstep must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&gamma) {
            return Err(ReplayBufferError::Configuration(format!(
                "gamma must be in [0, 1], got {}",
                gamma
            )));
        }
        Ok(Self { nstep, gamma })
    }

    /// Number of steps.
    pub fn nstep(&self) -> usize {
        self.nstep
    }

    /// Discount factor.
    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    /// Computes returns, discounts and bootstrap observations for `ixs`.
    ///
    /// Every index must be below the stored size of `store`.
    pub fn compute<O: Element, A: Element>(
        &self,
        store: &RingStore<'_, O, A>,
        ixs: &[usize],
    ) -> Result<NstepReturns<O>> {
        let stored_size = store.stored_size();
        for &ix in ixs {
            check_index(ix, stored_size)?;
        }

        let mask = store.capacity() - 1;
        let cursor = store.next_index();
        let mut out = NstepReturns {
            discounts: Vec::with_capacity(ixs.len()),
            returns: Vec::with_capacity(ixs.len() * store.reward_dim()),
            next_obs: Vec::with_capacity(ixs.len() * store.obs_dim()),
            is_done: Vec::with_capacity(ixs.len()),
        };

        for &ix in ixs {
            let mut tr = store.get(ix)?;
            let begin = out.returns.len();
            out.returns.extend_from_slice(tr.reward);
            let mut discount = self.gamma;

            let mut slot = ix;
            for _ in 1..self.nstep {
                let next = (slot + 1) & mask;
                if tr.is_done() || next == cursor {
                    break;
                }
                slot = next;
                tr = store.get(slot)?;
                out.returns[begin..]
                    .iter_mut()
                    .zip(tr.reward.iter())
                    .for_each(|(ret, r)| *ret += discount * r);
                discount *= self.gamma;
            }

            out.discounts.push(discount);
            out.next_obs.extend_from_slice(tr.next_obs);
            out.is_done.extend_from_slice(tr.is_done);
        }

        Ok(out)
    }
}
