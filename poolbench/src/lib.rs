#![warn(missing_docs)]
//! # Poolbench
//!
//! Benchmarks alternative strategies for spreading a batch of independent,
//! CPU-bound computations over a pool of worker processes.
//!
//! - **Process Pool**: workers are re-executions of the current binary, fed over fd 3/4 with rkyv frames
//! - **Five Strategies**: sequential loop, blocking apply, async apply, chunked async apply, map
//! - **Adaptive Chunking**: chunk size scales with input size to keep ~1000 tasks in flight
//! - **Failure Attribution**: a failing input is reported with its position and value
//! - **Harness**: one timed run per configuration, recorded to CSV or printed as human/JSON
//!
//! ## Quick Start
//!
//! ```ignore
//! use poolbench::{Computation, ComputationRegistry, ComputeError};
//!
//! fn collatz_steps(n: u64) -> Result<u64, ComputeError> {
//!     let (mut n, mut steps) = (n, 0);
//!     while n > 1 {
//!         n = if n % 2 == 0 { n / 2 } else { 3 * n + 1 };
//!         steps += 1;
//!     }
//!     Ok(steps)
//! }
//!
//! const COLLATZ: Computation<u64> = Computation::new("collatz", collatz_steps);
//!
//! fn main() -> anyhow::Result<()> {
//!     poolbench::run(ComputationRegistry::builtin().with(COLLATZ))
//! }
//! ```
//!
//! The registry passed to [`run`] is also the worker's registry, so every
//! computation a run can name is available on the other side of the pool.

// Re-export core types
pub use poolbench_core::{
    Algorithm, Computation, ComputationRegistry, ComputeError, DEFAULT_TARGET_CHUNKS,
    DispatchContext, DispatchError, FIBONACCI, FailureKind, ItemFailure, Output, PRIME_CHECKER,
    PendingItem, PendingResult, PoolError, ProcessPool, Progress, Strategy, StrategyRegistry,
    WorkerLauncher, auto_chunk_size, check_if_prime, fibonacci, run_chunk, run_item,
};

// Re-export harness types
pub use poolbench_cli::{
    CSV_HEADER, CsvSink, Harness, HarnessError, HarnessSettings, Isolation, Measurement,
    MeasurementSink, MemorySink, OutputFormat, PoolbenchConfig, RunConfig, RunPhase, RunReport,
};

/// Wire protocol between the pool and its workers
pub mod ipc {
    pub use poolbench_ipc::*;
}

/// Run the Poolbench CLI over a computation registry.
///
/// Call this from a binary's `main()`:
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     poolbench::run(poolbench::ComputationRegistry::builtin())
/// }
/// ```
pub use poolbench_cli::run;
