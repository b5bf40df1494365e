//! Transitions going into and out of a [`RingStore`](super::RingStore).

/// A borrowed view of `n` consecutive transitions, flattened per field.
///
/// Observations hold `n * obs_dim` scalars, actions `n * act_dim`, rewards
/// `n * reward_dim` and done flags `n`. The number of transitions is the
/// length of `is_done`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionRef<'t, O, A> {
    /// Observations.
    pub obs: &'t [O],

    /// Actions.
    pub act: &'t [A],

    /// Rewards.
    pub reward: &'t [f32],

    /// Observations at the next step.
    pub next_obs: &'t [O],

    /// Flags of the end of episodes, nonzero for done.
    pub is_done: &'t [i8],
}

impl<'t, O, A> TransitionRef<'t, O, A> {
    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.is_done.len()
    }

    /// Returns `true` if there is no transition.
    pub fn is_empty(&self) -> bool {
        self.is_done.is_empty()
    }

    /// Returns `true` if any of the transitions ends an episode.
    pub fn is_done(&self) -> bool {
        self.is_done.iter().any(|&d| d != 0)
    }
}

/// Owned transitions, flattened per field.
///
/// Batches sampled from a replay buffer additionally carry the sampled slot
/// indices, importance weights for prioritized sampling and, when n-step
/// returns are enabled, the discount to apply to the bootstrap value.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionBatch<O, A> {
    /// Observations.
    pub obs: Vec<O>,

    /// Actions.
    pub act: Vec<A>,

    /// Rewards, or n-step returns.
    pub reward: Vec<f32>,

    /// Observations at the next step, or the bootstrap observations of n-step returns.
    pub next_obs: Vec<O>,

    /// Flags of the end of episodes, nonzero for done.
    pub is_done: Vec<i8>,

    /// Importance weights for prioritized experience replay.
    pub weight: Option<Vec<f32>>,

    /// Slot indices of the sampled transitions.
    pub ix_sample: Option<Vec<usize>>,

    /// Discount factors of n-step returns.
    pub discount: Option<Vec<f32>>,
}

impl<O, A> TransitionBatch<O, A> {
    /// Creates an empty batch.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            obs: Vec::with_capacity(capacity),
            act: Vec::with_capacity(capacity),
            reward: Vec::with_capacity(capacity),
            next_obs: Vec::with_capacity(capacity),
            is_done: Vec::with_capacity(capacity),
            weight: None,
            ix_sample: None,
            discount: None,
        }
    }

    /// Builds a batch from the fields of transitions.
    pub fn new(obs: Vec<O>, act: Vec<A>, reward: Vec<f32>, next_obs: Vec<O>, is_done: Vec<i8>) -> Self {
        Self {
            obs,
            act,
            reward,
            next_obs,
            is_done,
            weight: None,
            ix_sample: None,
            discount: None,
        }
    }

    /// Number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.is_done.len()
    }

    /// Returns `true` if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.is_done.is_empty()
    }

    /// Borrows the fields of the batch.
    pub fn view(&self) -> TransitionRef<'_, O, A> {
        TransitionRef {
            obs: &self.obs,
            act: &self.act,
            reward: &self.reward,
            next_obs: &self.next_obs,
            is_done: &self.is_done,
        }
    }
}
