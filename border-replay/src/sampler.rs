//! Samplers of slot indices.
mod iw_scheduler;
mod prioritized;
mod uniform;
pub use iw_scheduler::IwScheduler;
pub(crate) use prioritized::check_finite;
pub use prioritized::{Priorities, PrioritizedSampler, WeightNormalizer};
pub use uniform::UniformSampler;
