//! Dispatch Strategies
//!
//! Interchangeable ways of evaluating one computation over an input
//! sequence. Every strategy returns results positionally aligned with the
//! inputs; only the way work reaches the workers differs.
//!
//! | Strategy                | Pool | Unit of work | Blocks                      |
//! |-------------------------|------|--------------|-----------------------------|
//! | `singleProcessLoop`     | no   | item         | never                       |
//! | `poolApply`             | yes  | item         | after every submission      |
//! | `poolApplyAsync`        | yes  | item         | once, while collecting      |
//! | `poolApplyAsyncChunked` | yes  | chunk        | once, while collecting      |
//! | `poolMap`               | yes  | chunk        | inside the pool's `map`     |

use crate::chunk::{DEFAULT_TARGET_CHUNKS, dispatch_chunk_size};
use crate::computation::{Computation, ComputeError, Output};
use crate::pool::{DispatchError, PendingItem, PendingResult, ProcessPool, WorkerLauncher};
use crate::progress::Progress;
use crate::runner::run_item;
use poolbench_ipc::FailureKind;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Everything a strategy needs besides the inputs and the computation
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Number of worker processes
    pub workers: usize,
    /// How workers are started
    pub launcher: WorkerLauncher,
    /// Progress observer around submission and collection
    pub progress: Progress,
    /// Chunk count the adaptive sizer aims for
    pub target_chunks: usize,
}

impl DispatchContext {
    /// Context with hidden progress and the default chunk target
    pub fn new(workers: usize, launcher: WorkerLauncher) -> Self {
        Self {
            workers,
            launcher,
            progress: Progress::hidden(),
            target_chunks: DEFAULT_TARGET_CHUNKS,
        }
    }

    /// Set the progress observer
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Set the chunk target
    pub fn with_target_chunks(mut self, target_chunks: usize) -> Self {
        self.target_chunks = target_chunks;
        self
    }

    fn start_pool(&self) -> Result<ProcessPool, DispatchError> {
        let pool = ProcessPool::start(self.workers, &self.launcher)?;
        Ok(pool.with_progress(self.progress))
    }
}

/// A way of distributing work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strategy {
    /// Plain loop on the calling thread
    SingleProcessLoop,
    /// Pool, one blocking submission per item
    PoolApply,
    /// Pool, submit every item then collect every handle
    PoolApplyAsync,
    /// Pool, submit adaptive chunks then collect and concatenate
    PoolApplyAsyncChunked,
    /// Pool's own `map` with the adaptive chunk size as split hint
    PoolMap,
}

impl Strategy {
    /// All strategies, in registry order
    pub const ALL: [Strategy; 5] = [
        Strategy::SingleProcessLoop,
        Strategy::PoolApply,
        Strategy::PoolApplyAsync,
        Strategy::PoolApplyAsyncChunked,
        Strategy::PoolMap,
    ];

    /// Stable registry name
    pub fn name(self) -> &'static str {
        match self {
            Strategy::SingleProcessLoop => "singleProcessLoop",
            Strategy::PoolApply => "poolApply",
            Strategy::PoolApplyAsync => "poolApplyAsync",
            Strategy::PoolApplyAsyncChunked => "poolApplyAsyncChunked",
            Strategy::PoolMap => "poolMap",
        }
    }

    /// Whether the strategy starts a worker pool
    pub fn uses_pool(self) -> bool {
        !matches!(self, Strategy::SingleProcessLoop)
    }

    /// Evaluate `computation` over `inputs`. `result[i]` belongs to `inputs[i]`.
    pub fn run<T: Output>(
        self,
        inputs: &[u64],
        computation: &Computation<T>,
        ctx: &DispatchContext,
    ) -> Result<Vec<T>, DispatchError> {
        debug!(
            strategy = self.name(),
            computation = computation.name(),
            inputs = inputs.len(),
            workers = ctx.workers,
            "dispatch"
        );
        match self {
            Strategy::SingleProcessLoop => single_process_loop(inputs, computation, ctx),
            Strategy::PoolApply => pool_apply(inputs, computation, ctx),
            Strategy::PoolApplyAsync => pool_apply_async(inputs, computation, ctx),
            Strategy::PoolApplyAsyncChunked => pool_apply_async_chunked(inputs, computation, ctx),
            Strategy::PoolMap => pool_map(inputs, computation, ctx),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn single_process_loop<T: Output>(
    inputs: &[u64],
    computation: &Computation<T>,
    ctx: &DispatchContext,
) -> Result<Vec<T>, DispatchError> {
    let mut results = Vec::with_capacity(inputs.len());
    for (index, &value) in ctx.progress.wrap("compute", inputs.iter()).enumerate() {
        let result = run_item(value, computation).map_err(|source| {
            let kind = match source {
                ComputeError::Failed(_) => FailureKind::Computation,
                ComputeError::Panicked(_) => FailureKind::Panic,
            };
            DispatchError::Computation {
                computation: computation.name().to_string(),
                index,
                value,
                kind,
                message: source.to_string(),
            }
        })?;
        results.push(result);
    }
    Ok(results)
}

fn pool_apply<T: Output>(
    inputs: &[u64],
    computation: &Computation<T>,
    ctx: &DispatchContext,
) -> Result<Vec<T>, DispatchError> {
    let pool = ctx.start_pool()?;
    let mut results = Vec::with_capacity(inputs.len());
    for (index, &value) in ctx.progress.wrap("apply", inputs.iter()).enumerate() {
        results.push(pool.apply(computation, index, value)?);
    }
    Ok(results)
}

fn pool_apply_async<T: Output>(
    inputs: &[u64],
    computation: &Computation<T>,
    ctx: &DispatchContext,
) -> Result<Vec<T>, DispatchError> {
    let pool = ctx.start_pool()?;
    let pending: Vec<PendingItem<T>> = ctx
        .progress
        .wrap("submit", inputs.iter())
        .enumerate()
        .map(|(index, &value)| pool.apply_async(computation, index, value))
        .collect();

    ctx.progress
        .wrap("collect", pending.into_iter())
        .map(PendingItem::get)
        .collect()
}

fn pool_apply_async_chunked<T: Output>(
    inputs: &[u64],
    computation: &Computation<T>,
    ctx: &DispatchContext,
) -> Result<Vec<T>, DispatchError> {
    let chunk_size = dispatch_chunk_size(inputs.len(), ctx.target_chunks);
    let pool = ctx.start_pool()?;
    let pending: Vec<PendingResult<T>> = ctx
        .progress
        .wrap("submit", inputs.chunks(chunk_size))
        .enumerate()
        .map(|(position, chunk)| pool.apply_chunk_async(computation, position * chunk_size, chunk))
        .collect();
    debug!(chunk_size, chunks = pending.len(), "chunks submitted");

    let mut results = Vec::with_capacity(inputs.len());
    for handle in ctx.progress.wrap("collect", pending.into_iter()) {
        results.extend(handle.get()?);
    }

    if results.len() != inputs.len() {
        return Err(DispatchError::LengthMismatch {
            expected: inputs.len(),
            got: results.len(),
        });
    }
    Ok(results)
}

fn pool_map<T: Output>(
    inputs: &[u64],
    computation: &Computation<T>,
    ctx: &DispatchContext,
) -> Result<Vec<T>, DispatchError> {
    let chunk_size = dispatch_chunk_size(inputs.len(), ctx.target_chunks);
    let pool = ctx.start_pool()?;
    pool.map(computation, inputs, chunk_size)
}

/// Name → strategy table, built explicitly and passed to the harness
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    entries: BTreeMap<&'static str, Strategy>,
}

impl StrategyRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in strategy under its stable name
    pub fn standard() -> Self {
        Strategy::ALL
            .into_iter()
            .fold(Self::new(), |registry, strategy| registry.with(strategy))
    }

    /// Builder-style registration under the strategy's own name
    pub fn with(mut self, strategy: Strategy) -> Self {
        self.entries.insert(strategy.name(), strategy);
        self
    }

    /// Look up a strategy by name
    pub fn get(&self, name: &str) -> Option<Strategy> {
        self.entries.get(name).copied()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }
}
