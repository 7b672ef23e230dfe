#![warn(missing_docs)]
//! Poolbench CLI Library
//!
//! This module provides the benchmark harness and the command-line front end.
//! Use `poolbench::run()` (or `poolbench_cli::run()`) in a main function to
//! get the full CLI over a computation registry. The same binary doubles as
//! the pool's worker executable.
//!
//! # Example
//!
//! ```ignore
//! use poolbench::ComputationRegistry;
//!
//! fn main() -> anyhow::Result<()> {
//!     poolbench_cli::run(ComputationRegistry::builtin())
//! }
//! ```

mod config;
mod harness;
mod report;
mod sink;

pub use config::{CONFIG_FILE, Isolation, OutputConfig, PoolbenchConfig, RunnerConfig};
pub use harness::{
    DEFAULT_ASYNC_CHUNK_THRESHOLD, Harness, HarnessError, HarnessSettings, RunConfig, RunPhase,
};
pub use report::{CSV_HEADER, Measurement, OutputFormat, RunReport, csv_row, format_report};
pub use sink::{CsvSink, MeasurementSink, MemorySink, SinkError};

use clap::{Parser, Subcommand};
use poolbench_core::{
    ComputationRegistry, Progress, StrategyRegistry, WorkerLauncher, WorkerMain,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Poolbench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "poolbench")]
#[command(author, version, about = "Poolbench - process pool dispatch strategy benchmarks")]
pub struct Cli {
    /// Optional subcommand (List, Run); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Computation to benchmark (e.g. primeChecker)
    #[arg(long, global = true)]
    pub algorithm: Option<String>,

    /// Dispatch strategy to benchmark (e.g. poolMap)
    #[arg(long, global = true)]
    pub benchmark: Option<String>,

    /// Inputs are 1..=N [default: 10000]
    #[arg(long, global = true)]
    pub upper_limit: Option<u64>,

    /// Number of worker processes [default: 4]
    #[arg(long, global = true)]
    pub num_processes: Option<usize>,

    /// Worker isolation mode
    #[arg(long, value_enum, global = true)]
    pub isolation: Option<Isolation>,

    /// Output format: human, json, csv
    #[arg(long, global = true)]
    pub format: Option<String>,

    /// Append the measurement to this CSV file
    #[arg(long, global = true)]
    pub csv: Option<PathBuf>,

    /// Show progress bars on stderr
    #[arg(long, global = true)]
    pub progress: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Internal: Run as pool worker process
    #[arg(long, hide = true)]
    pub pool_worker: bool,

    /// Unrecognised trailing arguments; reported and skipped
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub extra: Vec<String>,
}

/// CLI subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// List registered algorithms and strategies
    List,
    /// Run one benchmark (default)
    Run,
}

/// Run the Poolbench CLI with the given computations.
/// This is the main entry point for poolbench binaries.
///
/// # Returns
/// Returns `Ok(())` on success, or an error if the run failed.
pub fn run(computations: ComputationRegistry) -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli, computations)
}

/// Run the Poolbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli, computations: ComputationRegistry) -> anyhow::Result<()> {
    let computations = Arc::new(computations);

    // Handle worker mode first (before any other initialization)
    if cli.pool_worker {
        return run_worker_mode(computations);
    }

    init_tracing(cli.verbose);

    for arg in &cli.extra {
        warn!(argument = %arg, "not a valid parameter, skipping");
    }

    // Discover poolbench.toml configuration (CLI flags override)
    let config = PoolbenchConfig::discover()?.unwrap_or_default();
    let strategies = StrategyRegistry::standard();

    match cli.command {
        Some(Commands::List) => {
            print!("{}", format_listing(&computations, &strategies));
            Ok(())
        }
        Some(Commands::Run) | None => run_benchmark(&cli, &config, computations, strategies),
    }
}

/// Logs go to stderr; stdout carries only results.
fn init_tracing(verbose: bool) {
    // Target prefix match covers poolbench_core and poolbench_cli too.
    let filter = if verbose {
        "poolbench=debug"
    } else {
        "poolbench=info"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run as a worker process (IPC mode)
fn run_worker_mode(computations: Arc<ComputationRegistry>) -> anyhow::Result<()> {
    let mut worker = WorkerMain::from_env(computations)?;
    worker
        .run()
        .map_err(|e| anyhow::anyhow!("Worker error: {}", e))
}

fn format_listing(computations: &ComputationRegistry, strategies: &StrategyRegistry) -> String {
    let mut out = String::from("Algorithms:\n");
    for name in computations.names() {
        out.push_str(&format!("├── {name}\n"));
    }
    out.push_str("Benchmarks:\n");
    for name in strategies.names() {
        out.push_str(&format!("├── {name}\n"));
    }
    out
}

/// Build a RunConfig by layering: poolbench.toml defaults → CLI overrides.
fn build_run_config(cli: &Cli, config: &PoolbenchConfig) -> anyhow::Result<RunConfig> {
    let algorithm = cli
        .algorithm
        .clone()
        .ok_or_else(|| anyhow::anyhow!("--algorithm is required (see `poolbench list`)"))?;
    let strategy = cli
        .benchmark
        .clone()
        .ok_or_else(|| anyhow::anyhow!("--benchmark is required (see `poolbench list`)"))?;

    Ok(RunConfig {
        algorithm,
        strategy,
        workers: cli.num_processes.unwrap_or(config.runner.workers),
        upper_limit: cli.upper_limit.unwrap_or(config.runner.upper_limit),
    })
}

fn build_settings(
    cli: &Cli,
    config: &PoolbenchConfig,
    computations: &Arc<ComputationRegistry>,
) -> anyhow::Result<HarnessSettings> {
    let launcher = match cli.isolation.unwrap_or(config.runner.isolation) {
        Isolation::Process => WorkerLauncher::current_exe()?,
        Isolation::Thread => WorkerLauncher::threads(Arc::clone(computations)),
    };

    let mut settings = HarnessSettings::new(launcher);
    settings.progress = Progress::new(cli.progress || config.runner.progress);
    settings.async_chunk_threshold = config.runner.async_chunk_threshold;
    settings.target_chunks = config.runner.target_chunks;
    Ok(settings)
}

fn run_benchmark(
    cli: &Cli,
    config: &PoolbenchConfig,
    computations: Arc<ComputationRegistry>,
    strategies: StrategyRegistry,
) -> anyhow::Result<()> {
    let run_config = build_run_config(cli, config)?;
    let settings = build_settings(cli, config, &computations)?;

    let format_str = cli.format.as_deref().unwrap_or(&config.output.format);
    let format: OutputFormat = format_str.parse().unwrap_or_else(|e| {
        warn!("{e}, using human output");
        OutputFormat::Human
    });

    let mut harness = Harness::new(computations, strategies, settings);
    let report = match cli.csv.as_ref().or(config.output.csv_path.as_ref()) {
        Some(path) => harness.run_and_record(&run_config, &mut CsvSink::new(path))?,
        None => harness.run(&run_config)?,
    };

    println!("{}", format_report(&report, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("poolbench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_defaults_come_from_config() {
        let cli = parse(&["--algorithm", "primeChecker", "--benchmark", "poolMap"]);
        assert_eq!(cli.command, None);

        let run = build_run_config(&cli, &PoolbenchConfig::default()).unwrap();
        assert_eq!(run, RunConfig::new("primeChecker", "poolMap"));
    }

    #[test]
    fn test_cli_flags_override_config() {
        let cli = parse(&[
            "run",
            "--algorithm",
            "fibonacci",
            "--benchmark",
            "poolApply",
            "--upper-limit",
            "90",
            "--num-processes",
            "2",
        ]);
        assert_eq!(cli.command, Some(Commands::Run));

        let mut config = PoolbenchConfig::default();
        config.runner.workers = 16;
        config.runner.upper_limit = 1_000_000;

        let run = build_run_config(&cli, &config).unwrap();
        assert_eq!(run.workers, 2);
        assert_eq!(run.upper_limit, 90);
    }

    #[test]
    fn test_missing_algorithm_is_error() {
        let cli = parse(&["--benchmark", "poolMap"]);
        let err = build_run_config(&cli, &PoolbenchConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--algorithm"));
    }

    #[test]
    fn test_unknown_trailing_args_are_collected() {
        let cli = parse(&[
            "--algorithm",
            "primeChecker",
            "--benchmark",
            "poolMap",
            "chunky",
            "bacon",
        ]);
        assert_eq!(cli.extra, vec!["chunky", "bacon"]);
    }

    #[test]
    fn test_worker_flag_is_hidden_but_parsed() {
        let cli = parse(&["--pool-worker"]);
        assert!(cli.pool_worker);
    }

    #[test]
    fn test_isolation_flag() {
        let cli = parse(&["--isolation", "thread"]);
        assert_eq!(cli.isolation, Some(Isolation::Thread));

        let computations = Arc::new(ComputationRegistry::builtin());
        let settings = build_settings(&cli, &PoolbenchConfig::default(), &computations).unwrap();
        assert!(matches!(settings.launcher, WorkerLauncher::Thread { .. }));
        assert!(!settings.progress.is_enabled());
    }

    #[test]
    fn test_listing_names_everything() {
        let listing =
            format_listing(&ComputationRegistry::builtin(), &StrategyRegistry::standard());
        for name in [
            "primeChecker",
            "fibonacci",
            "singleProcessLoop",
            "poolApply",
            "poolApplyAsync",
            "poolApplyAsyncChunked",
            "poolMap",
        ] {
            assert!(listing.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_thread_isolated_run_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("runs.csv");
        let csv_arg = csv.to_string_lossy().into_owned();
        let cli = parse(&[
            "--algorithm",
            "primeChecker",
            "--benchmark",
            "poolApplyAsyncChunked",
            "--upper-limit",
            "300",
            "--num-processes",
            "2",
            "--isolation",
            "thread",
            "--csv",
            &csv_arg,
        ]);

        run_with_cli(cli, ComputationRegistry::builtin()).unwrap();

        let content = std::fs::read_to_string(&csv).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].contains(",primeChecker,poolApplyAsyncChunked,"));
    }

    #[test]
    fn test_failed_run_is_error() {
        let cli = parse(&[
            "--algorithm",
            "fibonacci",
            "--benchmark",
            "poolMap",
            "--upper-limit",
            "200",
            "--isolation",
            "thread",
        ]);
        let err = run_with_cli(cli, ComputationRegistry::builtin()).unwrap_err();
        assert!(err.to_string().contains("fibonacci failed on input #93"));
    }
}
