//! Computations and the registry that names them.
//!
//! A [`Computation`] is a named, pure `fn(u64) -> Result<T, ComputeError>`.
//! Worker processes cannot receive function pointers, so a computation
//! crosses the process boundary by name: both sides build the same
//! [`ComputationRegistry`] and the worker resolves the name locally.

use crate::pool::DispatchError;
use crate::runner::{ItemFailure, run_chunk};
use crate::strategy::{DispatchContext, Strategy};
use poolbench_ipc::{FrameError, decode_payload, encode_payload};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised by a computation for a single input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputeError {
    /// The computation rejected the input
    #[error("{0}")]
    Failed(String),
    /// The computation panicked; the payload message is kept
    #[error("panicked: {0}")]
    Panicked(String),
}

impl ComputeError {
    /// Shorthand for [`ComputeError::Failed`]
    pub fn failed(message: impl Into<String>) -> Self {
        ComputeError::Failed(message.into())
    }
}

/// Result types that can travel back from a worker process.
pub trait Output: Sized + Send + 'static {
    /// Encode a result vector for the reply frame
    fn encode(values: Vec<Self>) -> Result<Vec<u8>, FrameError>;
    /// Decode a result vector from a reply frame
    fn decode(payload: &[u8]) -> Result<Vec<Self>, FrameError>;
}

macro_rules! impl_output {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Output for $ty {
                fn encode(values: Vec<Self>) -> Result<Vec<u8>, FrameError> {
                    encode_payload(&values)
                }

                fn decode(payload: &[u8]) -> Result<Vec<Self>, FrameError> {
                    decode_payload::<Vec<$ty>>(payload)
                }
            }
        )*
    };
}

impl_output!(bool, u8, u16, u32, u64, i32, i64, f64);

/// A named pure function over one integer input.
pub struct Computation<T> {
    name: &'static str,
    func: fn(u64) -> Result<T, ComputeError>,
}

impl<T> Computation<T> {
    /// Create a computation. `name` must be unique within a registry.
    pub const fn new(name: &'static str, func: fn(u64) -> Result<T, ComputeError>) -> Self {
        Self { name, func }
    }

    /// Registry name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Apply the function directly (no panic handling; see [`crate::run_item`])
    pub fn call(&self, value: u64) -> Result<T, ComputeError> {
        (self.func)(value)
    }
}

impl<T> Clone for Computation<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Computation<T> {}

impl<T> fmt::Debug for Computation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("name", &self.name)
            .field("output", &std::any::type_name::<T>())
            .finish()
    }
}

/// Why a worker-side evaluation produced no payload
#[derive(Debug, Error)]
pub enum EvaluateError {
    /// An input failed; the chunk is discarded
    #[error(transparent)]
    Item(#[from] ItemFailure),
    /// The results could not be encoded
    #[error("failed to encode results: {0}")]
    Encoding(#[from] FrameError),
}

/// Type-erased computation, as stored in a [`ComputationRegistry`].
///
/// `evaluate` is the worker half (run a chunk, encode the results) and
/// `dispatch` is the harness half (run a strategy, report how many results
/// came back). Both are implemented for every `Computation<T: Output>`.
pub trait Algorithm: Send + Sync {
    /// Registry name
    fn name(&self) -> &'static str;

    /// Evaluate a chunk and encode the result vector
    fn evaluate(&self, values: &[u64]) -> Result<Vec<u8>, EvaluateError>;

    /// Run `strategy` over `inputs`, discarding the typed results
    fn dispatch(
        &self,
        strategy: Strategy,
        inputs: &[u64],
        ctx: &DispatchContext,
    ) -> Result<usize, DispatchError>;
}

impl<T: Output> Algorithm for Computation<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn evaluate(&self, values: &[u64]) -> Result<Vec<u8>, EvaluateError> {
        let results = run_chunk(values, self)?;
        Ok(T::encode(results)?)
    }

    fn dispatch(
        &self,
        strategy: Strategy,
        inputs: &[u64],
        ctx: &DispatchContext,
    ) -> Result<usize, DispatchError> {
        strategy.run(inputs, self, ctx).map(|results| results.len())
    }
}

/// Name → computation table, built explicitly and shared read-only.
#[derive(Clone, Default)]
pub struct ComputationRegistry {
    entries: BTreeMap<&'static str, Arc<dyn Algorithm>>,
}

impl ComputationRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the sample payloads (`primeChecker`, `fibonacci`)
    pub fn builtin() -> Self {
        Self::new()
            .with(crate::payloads::PRIME_CHECKER)
            .with(crate::payloads::FIBONACCI)
    }

    /// Builder-style [`register`](Self::register)
    pub fn with<T: Output>(mut self, computation: Computation<T>) -> Self {
        self.register(computation);
        self
    }

    /// Add a computation, replacing any previous entry with the same name
    pub fn register<T: Output>(&mut self, computation: Computation<T>) -> &mut Self {
        self.entries.insert(computation.name(), Arc::new(computation));
        self
    }

    /// Look up a computation by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Algorithm>> {
        self.entries.get(name).cloned()
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Number of registered computations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ComputationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
