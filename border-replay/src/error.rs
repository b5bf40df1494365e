//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayBufferError {
    /// Invalid parameters given at construction.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Sampling from a buffer without stored transitions.
    #[error("Cannot sample from an empty buffer")]
    EmptyBuffer,

    /// A slot index outside of the valid range.
    #[error("Index {index} is out of range (bound = {bound})")]
    OutOfRange {
        /// The offending index.
        index: usize,
        /// Exclusive upper bound of valid indices.
        bound: usize,
    },

    /// Index and priority arrays of different lengths.
    #[error("Length mismatch: {indices} indices and {priorities} priorities")]
    LengthMismatch {
        /// Number of indices.
        indices: usize,
        /// Number of priorities.
        priorities: usize,
    },

    /// Arguments inconsistent with the declared shape of the buffer.
    #[error("Contract violation: {0}")]
    ContractViolation(String),
}

/// Result type of the operations on buffers, trees and samplers.
pub type Result<T> = std::result::Result<T, ReplayBufferError>;

pub(crate) fn check_index(index: usize, bound: usize) -> Result<()> {
    if index < bound {
        Ok(())
    } else {
        Err(ReplayBufferError::OutOfRange { index, bound })
    }
}
