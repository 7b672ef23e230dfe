#![warn(missing_docs)]
//! Poolbench Core - Pool Runtime
//!
//! This crate provides everything that runs a computation over an input
//! sequence:
//! - `Computation` and `ComputationRegistry` for naming pure workloads
//! - `ProcessPool` backed by re-executed worker processes
//! - The five dispatch `Strategy` variants and adaptive chunk sizing
//! - `WorkerMain`, the worker side of the pool protocol

mod chunk;
mod computation;
mod payloads;
mod pool;
mod progress;
mod runner;
mod strategy;
mod worker;

pub use chunk::{DEFAULT_TARGET_CHUNKS, MAX_CHUNK_LEN, auto_chunk_size, dispatch_chunk_size};
pub use computation::{
    Algorithm, Computation, ComputationRegistry, ComputeError, EvaluateError, Output,
};
pub use payloads::{FIBONACCI, PRIME_CHECKER, check_if_prime, fibonacci};
pub use pool::{
    DispatchError, PendingItem, PendingResult, PoolError, ProcessPool, WorkerHandle,
    WorkerLauncher,
};
pub use progress::Progress;
pub use runner::{ItemFailure, run_chunk, run_item};
pub use strategy::{DispatchContext, Strategy, StrategyRegistry};
pub use worker::{WorkerError, WorkerMain};

pub use poolbench_ipc::FailureKind;
