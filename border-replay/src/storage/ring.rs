//! Ring buffer of transitions.
use super::{
    concurrency::{ConcurrencyMode, WriteCounters},
    field::{Element, FieldStore},
    transition::{TransitionBatch, TransitionRef},
};
use crate::error::{check_index, ReplayBufferError, Result};
use log::{debug, info};

/// Buffers supplied by the caller in place of allocating new ones.
///
/// Each buffer must hold `capacity * dim` scalars of its field, where
/// `capacity` is the capacity after rounding up to a power of two.
pub struct ExternalBuffers<'a, O, A> {
    /// Observations, `capacity * obs_dim` scalars.
    pub obs: Option<&'a mut [O]>,

    /// Actions, `capacity * act_dim` scalars.
    pub act: Option<&'a mut [A]>,

    /// Rewards, `capacity * reward_dim` scalars.
    pub reward: Option<&'a mut [f32]>,

    /// Next observations, `capacity * obs_dim` scalars.
    pub next_obs: Option<&'a mut [O]>,

    /// Done flags, `capacity` scalars.
    pub is_done: Option<&'a mut [i8]>,
}

impl<'a, O, A> Default for ExternalBuffers<'a, O, A> {
    fn default() -> Self {
        Self {
            obs: None,
            act: None,
            reward: None,
            next_obs: None,
            is_done: None,
        }
    }
}

fn field<'a, T: Element>(
    buffer: Option<&'a mut [T]>,
    capacity: usize,
    dim: usize,
) -> Result<FieldStore<'a, T>> {
    match buffer {
        Some(buffer) => FieldStore::borrowed(buffer, capacity, dim),
        None => FieldStore::owned(capacity, dim),
    }
}

/// Fixed-capacity ring buffer of transitions.
///
/// The capacity is rounded up to the next power of two. When the buffer is
/// full, each write overwrites the oldest transitions.
pub struct RingStore<'a, O, A> {
    capacity: usize,
    mask: usize,
    obs: FieldStore<'a, O>,
    act: FieldStore<'a, A>,
    reward: FieldStore<'a, f32>,
    next_obs: FieldStore<'a, O>,
    is_done: FieldStore<'a, i8>,
    mode: ConcurrencyMode,
    counters: Box<dyn WriteCounters>,
}

impl<'a, O: Element, A: Element> RingStore<'a, O, A> {
    /// Creates a ring store allocating all of its fields.
    pub fn new(
        capacity: usize,
        obs_dim: usize,
        act_dim: usize,
        reward_dim: usize,
        mode: ConcurrencyMode,
    ) -> Result<Self> {
        Self::with_buffers(
            capacity,
            obs_dim,
            act_dim,
            reward_dim,
            mode,
            ExternalBuffers::default(),
        )
    }

    /// Creates a ring store on top of the given external buffers.
    ///
    /// Fields without an external buffer are allocated.
    pub fn with_buffers(
        capacity: usize,
        obs_dim: usize,
        act_dim: usize,
        reward_dim: usize,
        mode: ConcurrencyMode,
        buffers: ExternalBuffers<'a, O, A>,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(ReplayBufferError::Configuration(
                "Capacity must be at least 1".to_string(),
            ));
        }
        let capacity = capacity.checked_next_power_of_two().ok_or_else(|| {
            ReplayBufferError::Configuration(format!("Capacity {} is too large", capacity))
        })?;

        info!(
            "Construct ring store with capacity = {}, obs_dim = {}, act_dim = {}, mode = {:?}",
            capacity, obs_dim, act_dim, mode
        );

        Ok(Self {
            capacity,
            mask: capacity - 1,
            obs: field(buffers.obs, capacity, obs_dim)?,
            act: field(buffers.act, capacity, act_dim)?,
            reward: field(buffers.reward, capacity, reward_dim)?,
            next_obs: field(buffers.next_obs, capacity, obs_dim)?,
            is_done: field(buffers.is_done, capacity, 1)?,
            mode,
            counters: mode.counters(capacity),
        })
    }

    /// Number of slots, a power of two.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Dimension of observations.
    pub fn obs_dim(&self) -> usize {
        self.obs.dim()
    }

    /// Dimension of actions.
    pub fn act_dim(&self) -> usize {
        self.act.dim()
    }

    /// Dimension of rewards.
    pub fn reward_dim(&self) -> usize {
        self.reward.dim()
    }

    /// Concurrency mode of the counters.
    pub fn mode(&self) -> ConcurrencyMode {
        self.mode
    }

    /// Slot receiving the next write.
    pub fn next_index(&self) -> usize {
        self.counters.next_index() & self.mask
    }

    /// Number of valid slots, at most the capacity.
    pub fn stored_size(&self) -> usize {
        self.counters.stored_size()
    }

    /// Stores transitions and returns the slot of the first one.
    ///
    /// A run crossing the end of the buffer is split into a tail run and a
    /// head run. Storing no transition returns the current cursor.
    pub fn store(&mut self, tr: TransitionRef<'_, O, A>) -> Result<usize> {
        let n = self.check_transitions(&tr)?;
        if n == 0 {
            return Ok(self.next_index());
        }
        // Nothing is in flight under `&mut self`, so the reservation succeeds.
        let raw = self
            .counters
            .try_reserve(n)
            .ok_or_else(|| self.lapping(n))?;
        // SAFETY: `&mut self` excludes any other access to the fields.
        Ok(unsafe { self.write_reserved(raw, &tr) })
    }

    /// Returns a handle storing transitions from many threads at once.
    ///
    /// Only available in [`ConcurrencyMode::MultiWriter`].
    pub fn shared_writer(&mut self) -> Result<SharedWriter<'_, 'a, O, A>> {
        if !self.mode.is_multi_writer() {
            return Err(ReplayBufferError::Configuration(
                "Shared writes need ConcurrencyMode::MultiWriter".to_string(),
            ));
        }
        Ok(SharedWriter { store: self })
    }

    fn check_transitions(&self, tr: &TransitionRef<'_, O, A>) -> Result<usize> {
        let n = tr.len();
        let check = |name: &str, len: usize, dim: usize| {
            if len == n * dim {
                Ok(())
            } else {
                Err(ReplayBufferError::ContractViolation(format!(
                    "{} has {} elements, {} (= {} x {}) expected",
                    name,
                    len,
                    n * dim,
                    n,
                    dim
                )))
            }
        };
        check("obs", tr.obs.len(), self.obs.dim())?;
        check("act", tr.act.len(), self.act.dim())?;
        check("reward", tr.reward.len(), self.reward.dim())?;
        check("next_obs", tr.next_obs.len(), self.obs.dim())?;

        if n > self.capacity {
            return Err(ReplayBufferError::ContractViolation(format!(
                "Cannot store {} transitions at once in a buffer of capacity {}",
                n, self.capacity
            )));
        }
        Ok(n)
    }

    fn lapping(&self, n: usize) -> ReplayBufferError {
        ReplayBufferError::ContractViolation(format!(
            "Storing {} transitions would overwrite slots still being written, capacity = {}",
            n, self.capacity
        ))
    }

    /// Writes `tr` to the run reserved at the raw cursor `raw` and publishes
    /// it. Returns the slot of the first transition.
    ///
    /// # Safety
    ///
    /// The run must come from `self.counters.try_reserve(tr.len())`, and no
    /// one may read the fields until it is published.
    unsafe fn write_reserved(&self, raw: usize, tr: &TransitionRef<'_, O, A>) -> usize {
        let n = tr.len();
        let start = raw & self.mask;
        let n_tail = n.min(self.capacity - start);
        self.write_run(start, tr, 0, n_tail);
        if n_tail < n {
            self.write_run(0, tr, n_tail, n - n_tail);
        }
        self.counters.publish(raw, n);
        start
    }

    unsafe fn write_run(&self, slot: usize, tr: &TransitionRef<'_, O, A>, shift: usize, n: usize) {
        let range = |dim: usize| shift * dim..(shift + n) * dim;
        self.obs.write_unchecked(slot, &tr.obs[range(self.obs.dim())]);
        self.act.write_unchecked(slot, &tr.act[range(self.act.dim())]);
        self.reward
            .write_unchecked(slot, &tr.reward[range(self.reward.dim())]);
        self.next_obs
            .write_unchecked(slot, &tr.next_obs[range(self.obs.dim())]);
        self.is_done.write_unchecked(slot, &tr.is_done[range(1)]);
    }

    /// Reads the transition at `slot`.
    ///
    /// Slots at or beyond [`RingStore::stored_size`] hold stale or default
    /// values.
    pub fn get(&self, slot: usize) -> Result<TransitionRef<'_, O, A>> {
        check_index(slot, self.capacity)?;
        Ok(TransitionRef {
            obs: self.obs.item(slot)?,
            act: self.act.item(slot)?,
            reward: self.reward.item(slot)?,
            next_obs: self.next_obs.item(slot)?,
            is_done: self.is_done.item(slot)?,
        })
    }

    /// Copies the transitions at the given slots into a batch.
    pub fn gather(&self, ixs: &[usize]) -> Result<TransitionBatch<O, A>> {
        let n = ixs.len();
        let mut batch = TransitionBatch {
            obs: Vec::with_capacity(n * self.obs.dim()),
            act: Vec::with_capacity(n * self.act.dim()),
            reward: Vec::with_capacity(n * self.reward.dim()),
            next_obs: Vec::with_capacity(n * self.obs.dim()),
            is_done: Vec::with_capacity(n),
            weight: None,
            ix_sample: Some(ixs.to_vec()),
            discount: None,
        };

        for &ix in ixs {
            let tr = self.get(ix)?;
            batch.obs.extend_from_slice(tr.obs);
            batch.act.extend_from_slice(tr.act);
            batch.reward.extend_from_slice(tr.reward);
            batch.next_obs.extend_from_slice(tr.next_obs);
            batch.is_done.extend_from_slice(tr.is_done);
        }

        Ok(batch)
    }

    /// Empties the buffer. The content of the fields is left untouched.
    pub fn clear(&mut self) {
        debug!("Clear ring store");
        self.counters.reset();
    }
}

/// Handle for storing transitions from many threads.
///
/// Each call reserves a run of slots on the atomic cursor. A reservation is
/// refused while it would overwrite a run another thread is still writing,
/// and runs are published in the order they were reserved, so
/// [`SharedWriter::stored_size`] only counts fully written transitions. The
/// ring store stays borrowed while the handle is alive, so no one reads slots
/// being written.
pub struct SharedWriter<'s, 'a, O, A> {
    store: &'s RingStore<'a, O, A>,
}

impl<'s, 'a, O, A> Clone for SharedWriter<'s, 'a, O, A> {
    fn clone(&self) -> Self {
        Self { store: self.store }
    }
}

impl<'s, 'a, O, A> Copy for SharedWriter<'s, 'a, O, A> {}

impl<'s, 'a, O: Element, A: Element> SharedWriter<'s, 'a, O, A> {
    /// Stores transitions and returns the slot of the first one.
    ///
    /// Waits while the run would overwrite slots other threads are still
    /// writing.
    pub fn store(&self, tr: TransitionRef<'_, O, A>) -> Result<usize> {
        let n = self.store.check_transitions(&tr)?;
        if n == 0 {
            return Ok(self.store.next_index());
        }
        let raw = loop {
            match self.store.counters.try_reserve(n) {
                Some(raw) => break raw,
                None => std::thread::yield_now(),
            }
        };
        // SAFETY: the run is reserved, and the store is borrowed by this handle.
        Ok(unsafe { self.store.write_reserved(raw, &tr) })
    }

    /// Stores transitions like [`SharedWriter::store`], but fails with
    /// [`ReplayBufferError::ContractViolation`] instead of waiting.
    pub fn try_store(&self, tr: TransitionRef<'_, O, A>) -> Result<usize> {
        let n = self.store.check_transitions(&tr)?;
        if n == 0 {
            return Ok(self.store.next_index());
        }
        let raw = self
            .store
            .counters
            .try_reserve(n)
            .ok_or_else(|| self.store.lapping(n))?;
        // SAFETY: the run is reserved, and the store is borrowed by this handle.
        Ok(unsafe { self.store.write_reserved(raw, &tr) })
    }

    /// Number of transitions published so far, at most the capacity.
    pub fn stored_size(&self) -> usize {
        self.store.stored_size()
    }
}
