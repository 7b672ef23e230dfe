//! Work item runner: one input, or one chunk of inputs.

use crate::computation::{ComputeError, Computation};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// An input that failed inside a chunk.
///
/// `index` is relative to the chunk it was found in; callers that know the
/// chunk's offset translate it to an absolute position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("input #{index} ({value}): {source}")]
pub struct ItemFailure {
    /// Position of the failing input within the chunk
    pub index: usize,
    /// The failing input value
    pub value: u64,
    /// What the computation reported
    pub source: ComputeError,
}

/// Apply `computation` to a single value.
///
/// Errors returned by the computation propagate unchanged. A panic is caught
/// and reported as [`ComputeError::Panicked`].
pub fn run_item<T>(value: u64, computation: &Computation<T>) -> Result<T, ComputeError> {
    match panic::catch_unwind(AssertUnwindSafe(|| computation.call(value))) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            Err(ComputeError::Panicked(message))
        }
    }
}

/// Apply `computation` to every value of `chunk`, in order.
///
/// The first failure aborts the chunk; no partial results are returned.
pub fn run_chunk<T>(chunk: &[u64], computation: &Computation<T>) -> Result<Vec<T>, ItemFailure> {
    chunk
        .iter()
        .enumerate()
        .map(|(index, &value)| {
            run_item(value, computation).map_err(|source| ItemFailure {
                index,
                value,
                source,
            })
        })
        .collect()
}
