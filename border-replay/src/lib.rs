#![warn(missing_docs)]
//! Fixed-capacity experience replay for reinforcement learning.
//!
//! Transitions are kept in a [`RingStore`], a ring buffer of flat per-field
//! arrays whose capacity is a power of two. On top of it:
//!
//! * [`ReplayBuffer`] samples transitions uniformly.
//! * [`PrioritizedReplayBuffer`] samples them in proportion to their
//!   priorities, using a sum [`ReductionTree`] for sampling and a min tree
//!   for normalizing importance weights.
//! * [`NstepAccumulator`] replaces sampled rewards with n-step returns.
//!
//! Both buffers are built from a [`ReplayBufferConfig`] and implement
//! [`ExperienceBufferBase`] and [`ReplayBufferBase`].
//!
//! ```rust
//! use border_replay::{
//!     ExperienceBufferBase, PerConfig, PrioritizedReplayBuffer, ReplayBufferBase,
//!     ReplayBufferConfig, TransitionBatch,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ReplayBufferConfig::default()
//!     .capacity(1000)
//!     .obs_dim(2)
//!     .per_config(Some(PerConfig::default()));
//! let mut buffer = PrioritizedReplayBuffer::<f32, i64>::build(&config)?;
//!
//! buffer.push(TransitionBatch::new(
//!     vec![0.0, 0.0, 0.1, 0.2],
//!     vec![1, 0],
//!     vec![0.0, 1.0],
//!     vec![0.1, 0.2, 0.3, 0.4],
//!     vec![0, 1],
//! ))?;
//!
//! let batch = buffer.batch(4)?;
//! let td_err = vec![0.5; 4];
//! buffer.update_priority(&batch.ix_sample, &Some(td_err))?;
//! # Ok(())
//! # }
//! ```
//!
//! With [`ConcurrencyMode::MultiWriter`], many threads can store transitions
//! at once through a [`SharedWriter`].
mod base;
pub mod error;
mod nstep;
mod replay_buffer;
pub mod sampler;
pub mod segment_tree;
pub mod storage;
pub use base::{ExperienceBufferBase, ReplayBufferBase};
pub use error::{ReplayBufferError, Result};
pub use nstep::{NstepAccumulator, NstepReturns};
pub use replay_buffer::{
    NstepConfig, PerConfig, PrioritizedReplayBuffer, ReplayBuffer, ReplayBufferConfig,
};
pub use sampler::{IwScheduler, Priorities, PrioritizedSampler, UniformSampler, WeightNormalizer};
pub use segment_tree::{Min, Reduction, ReductionTree, Sum};
pub use storage::{
    ConcurrencyMode, Element, ExternalBuffers, FieldStore, Ownership, RingStore, SharedWriter,
    TransitionBatch, TransitionRef,
};
