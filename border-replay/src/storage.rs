//! Fixed-capacity storage of transitions.
//!
//! A [`RingStore`] keeps one [`FieldStore`] per field of a transition
//! (observation, action, reward, next observation and done flag) and a write
//! cursor that wraps around the capacity. The capacity is always a power of two,
//! so the cursor is wrapped with a bit mask.
mod concurrency;
mod field;
mod ring;
mod transition;
pub use concurrency::{ConcurrencyMode, RunningMax, WriteCounters};
pub use field::{Element, FieldStore, Ownership};
pub use ring::{ExternalBuffers, RingStore, SharedWriter};
pub use transition::{TransitionBatch, TransitionRef};
