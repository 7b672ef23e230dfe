//! Benchmark Harness
//!
//! Resolves a run configuration against the computation and strategy
//! registries, builds the input sequence, times one dispatch and produces a
//! [`RunReport`].
//!
//! ```text
//!   Idle ──run──► Running ──ok / err──► Reported
//! ```
//!
//! A run that fails still ends in `Reported`, but produces no measurement.

use crate::report::{Measurement, RunReport};
use crate::sink::{MeasurementSink, SinkError};
use chrono::Utc;
use poolbench_core::{
    Computation, ComputationRegistry, DEFAULT_TARGET_CHUNKS, DispatchContext, DispatchError,
    Output, Progress, Strategy, StrategyRegistry, WorkerLauncher,
};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Input size above which `poolApplyAsync` is replaced by its chunked form
pub const DEFAULT_ASYNC_CHUNK_THRESHOLD: usize = 200_000;

/// Errors from a harness run
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Algorithm name not in the computation registry
    #[error("unknown algorithm '{name}' (available: {})", available.join(", "))]
    UnknownAlgorithm {
        /// Requested name
        name: String,
        /// Registered names
        available: Vec<&'static str>,
    },

    /// Strategy name not in the strategy registry
    #[error("unknown benchmark '{name}' (available: {})", available.join(", "))]
    UnknownStrategy {
        /// Requested name
        name: String,
        /// Registered names
        available: Vec<&'static str>,
    },

    /// Worker count of zero
    #[error("number of processes must be at least 1")]
    InvalidWorkers,

    /// Upper limit of zero
    #[error("upper limit must be at least 1")]
    InvalidUpperLimit,

    /// Chunk target of zero
    #[error("target chunk count must be at least 1")]
    InvalidTargetChunks,

    /// The strategy failed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The measurement could not be persisted
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Where the harness is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// No run in progress
    Idle,
    /// A strategy is dispatching
    Running,
    /// The last run finished; it has a report only if it succeeded
    Reported,
}

/// One benchmark invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Computation name (ignored by [`Harness::run_with`])
    pub algorithm: String,
    /// Strategy name
    pub strategy: String,
    /// Worker count
    pub workers: usize,
    /// Inputs are `1..=upper_limit`
    pub upper_limit: u64,
}

impl RunConfig {
    /// Run config with the default size (10 000 inputs, 4 workers)
    pub fn new(algorithm: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            strategy: strategy.into(),
            workers: 4,
            upper_limit: 10_000,
        }
    }

    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the upper limit
    pub fn with_upper_limit(mut self, upper_limit: u64) -> Self {
        self.upper_limit = upper_limit;
        self
    }
}

/// Settings shared by every run of a harness
#[derive(Debug, Clone)]
pub struct HarnessSettings {
    /// How pool workers are started
    pub launcher: WorkerLauncher,
    /// Progress observer handed to strategies
    pub progress: Progress,
    /// Input size above which `poolApplyAsync` runs chunked
    pub async_chunk_threshold: usize,
    /// Chunk count the adaptive chunk sizer aims for
    pub target_chunks: usize,
}

impl HarnessSettings {
    /// Defaults: hidden progress, 200 000 threshold, 1000 target chunks
    pub fn new(launcher: WorkerLauncher) -> Self {
        Self {
            launcher,
            progress: Progress::hidden(),
            async_chunk_threshold: DEFAULT_ASYNC_CHUNK_THRESHOLD,
            target_chunks: DEFAULT_TARGET_CHUNKS,
        }
    }
}

struct Plan {
    strategy: Strategy,
    substituted_from: Option<Strategy>,
    inputs: Vec<u64>,
}

/// Times strategies against computations
pub struct Harness {
    computations: Arc<ComputationRegistry>,
    strategies: StrategyRegistry,
    settings: HarnessSettings,
    phase: RunPhase,
}

impl Harness {
    /// Harness over explicit registries
    pub fn new(
        computations: Arc<ComputationRegistry>,
        strategies: StrategyRegistry,
        settings: HarnessSettings,
    ) -> Self {
        Self {
            computations,
            strategies,
            settings,
            phase: RunPhase::Idle,
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Computation registry
    pub fn computations(&self) -> &ComputationRegistry {
        &self.computations
    }

    /// Strategy registry
    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Run the registered computation named by `config.algorithm`
    pub fn run(&mut self, config: &RunConfig) -> Result<RunReport, HarnessError> {
        let algorithm =
            self.computations
                .get(&config.algorithm)
                .ok_or_else(|| HarnessError::UnknownAlgorithm {
                    name: config.algorithm.clone(),
                    available: self.computations.names(),
                })?;
        let plan = self.plan(config)?;

        let (report, ()) = self.measure(algorithm.name(), config, plan, |strategy, inputs, ctx| {
            algorithm
                .dispatch(strategy, inputs, ctx)
                .map(|count| (count, ()))
        })?;
        Ok(report)
    }

    /// Run a typed computation and keep its results.
    ///
    /// With process workers, `computation` must also be registered in the
    /// worker binary's registry.
    pub fn run_with<T: Output>(
        &mut self,
        config: &RunConfig,
        computation: &Computation<T>,
    ) -> Result<(RunReport, Vec<T>), HarnessError> {
        let plan = self.plan(config)?;
        self.measure(computation.name(), config, plan, |strategy, inputs, ctx| {
            strategy
                .run(inputs, computation, ctx)
                .map(|results| (results.len(), results))
        })
    }

    /// [`run`](Self::run), then hand the report to `sink`
    pub fn run_and_record(
        &mut self,
        config: &RunConfig,
        sink: &mut dyn MeasurementSink,
    ) -> Result<RunReport, HarnessError> {
        let report = self.run(config)?;
        sink.record(&report)?;
        Ok(report)
    }

    fn plan(&self, config: &RunConfig) -> Result<Plan, HarnessError> {
        let requested =
            self.strategies
                .get(&config.strategy)
                .ok_or_else(|| HarnessError::UnknownStrategy {
                    name: config.strategy.clone(),
                    available: self.strategies.names(),
                })?;
        if config.workers == 0 {
            return Err(HarnessError::InvalidWorkers);
        }
        if config.upper_limit == 0 {
            return Err(HarnessError::InvalidUpperLimit);
        }
        if self.settings.target_chunks == 0 {
            return Err(HarnessError::InvalidTargetChunks);
        }

        let inputs: Vec<u64> = (1..=config.upper_limit).collect();
        let (strategy, substituted_from) = if requested == Strategy::PoolApplyAsync
            && inputs.len() > self.settings.async_chunk_threshold
        {
            warn!(
                requested = %requested,
                substitute = %Strategy::PoolApplyAsyncChunked,
                inputs = inputs.len(),
                threshold = self.settings.async_chunk_threshold,
                "input too large for per-item async dispatch, running chunked"
            );
            (Strategy::PoolApplyAsyncChunked, Some(requested))
        } else {
            (requested, None)
        };

        Ok(Plan {
            strategy,
            substituted_from,
            inputs,
        })
    }

    fn measure<R>(
        &mut self,
        algorithm: &str,
        config: &RunConfig,
        plan: Plan,
        dispatch: impl FnOnce(Strategy, &[u64], &DispatchContext) -> Result<(usize, R), DispatchError>,
    ) -> Result<(RunReport, R), HarnessError> {
        let ctx = DispatchContext::new(config.workers, self.settings.launcher.clone())
            .with_progress(self.settings.progress)
            .with_target_chunks(self.settings.target_chunks);

        self.phase = RunPhase::Running;
        info!(
            algorithm,
            strategy = %plan.strategy,
            workers = config.workers,
            inputs = plan.inputs.len(),
            "run started"
        );

        let start = Instant::now();
        let outcome = dispatch(plan.strategy, &plan.inputs, &ctx);
        let elapsed = start.elapsed();

        let (result_count, results) = match outcome {
            Ok(done) => done,
            Err(e) => {
                self.phase = RunPhase::Reported;
                debug!(error = %e, "run failed");
                return Err(e.into());
            }
        };

        let report = RunReport {
            measurement: Measurement {
                algorithm: algorithm.to_string(),
                strategy: plan.strategy.name().to_string(),
                workers: config.workers,
                input_size: plan.inputs.len(),
                elapsed_secs: elapsed.as_secs_f64(),
            },
            substituted_from: plan.substituted_from.map(|s| s.name().to_string()),
            result_count,
            recorded_at: Utc::now(),
        };
        self.phase = RunPhase::Reported;
        info!(
            elapsed_secs = report.measurement.elapsed_secs,
            results = result_count,
            "run finished"
        );
        Ok((report, results))
    }
}
