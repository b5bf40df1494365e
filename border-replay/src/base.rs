//! Interfaces of replay buffers.
//!
//! The two traits separate storing experiences, done by processes
//! interacting with environments, from generating batches, done by the
//! trainer.
use anyhow::Result;

/// Interface of buffers storing experiences from environments.
pub trait ExperienceBufferBase {
    /// Items stored in the buffer.
    type Item;

    /// Pushes an item into the buffer.
    fn push(&mut self, tr: Self::Item) -> Result<()>;

    /// The number of stored experiences.
    fn len(&self) -> usize;

    /// Returns `true` if no experience is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface of replay buffers generating batches for training.
///
/// Independent of [`ExperienceBufferBase`].
pub trait ReplayBufferBase {
    /// Configuration of the replay buffer.
    type Config: Clone;

    /// Batches generated by the buffer.
    type Batch;

    /// Builds a replay buffer from the configuration.
    fn build(config: &Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Constructs a batch of `size` experiences.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;

    /// Updates the priorities of sampled experiences with TD errors.
    ///
    /// Buffers without priorities ignore the call.
    fn update_priority(&mut self, ixs: &Option<Vec<usize>>, td_err: &Option<Vec<f32>>)
        -> Result<()>;

    /// Removes all the experiences.
    fn clear(&mut self);
}
