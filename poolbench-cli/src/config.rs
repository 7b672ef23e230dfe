//! Configuration loading from poolbench.toml
//!
//! Poolbench configuration can be specified in a `poolbench.toml` file in the
//! project root. The configuration is automatically discovered by walking up
//! from the current directory. Command-line flags override it.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file searched for by [`PoolbenchConfig::discover`]
pub const CONFIG_FILE: &str = "poolbench.toml";

/// Poolbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PoolbenchConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// How pool workers are started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Isolation {
    /// Each worker is a separate process (default)
    #[default]
    Process,
    /// Workers are threads of the benchmark process (debugging)
    Thread,
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of worker processes
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Inputs are `1..=upper_limit`
    #[serde(default = "default_upper_limit")]
    pub upper_limit: u64,
    /// Isolation mode: "process" or "thread"
    #[serde(default)]
    pub isolation: Isolation,
    /// Input size above which `poolApplyAsync` is replaced by its chunked form
    #[serde(default = "default_async_chunk_threshold")]
    pub async_chunk_threshold: usize,
    /// Chunk count the adaptive chunk sizer aims for
    #[serde(default = "default_target_chunks")]
    pub target_chunks: usize,
    /// Draw progress bars on stderr
    #[serde(default)]
    pub progress: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            upper_limit: default_upper_limit(),
            isolation: Isolation::default(),
            async_chunk_threshold: default_async_chunk_threshold(),
            target_chunks: default_target_chunks(),
            progress: false,
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_upper_limit() -> u64 {
    10_000
}
fn default_async_chunk_threshold() -> usize {
    200_000
}
fn default_target_chunks() -> usize {
    poolbench_core::DEFAULT_TARGET_CHUNKS
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human", "json", "csv"
    #[serde(default = "default_format")]
    pub format: String,
    /// Append every measurement to this CSV file
    #[serde(default)]
    pub csv_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            csv_path: None,
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}

impl PoolbenchConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run can use. Worker count and upper limit are
    /// checked per run instead, since flags may override them.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runner.target_chunks == 0 {
            bail!("runner.target_chunks must be at least 1");
        }
        Ok(())
    }

    /// Discover and load configuration by walking up from the current
    /// directory. A config file that fails to load is an error.
    pub fn discover() -> anyhow::Result<Option<Self>> {
        Self::discover_from(std::env::current_dir()?)
    }

    /// Walk up from `dir` looking for `poolbench.toml`
    pub fn discover_from(mut dir: PathBuf) -> anyhow::Result<Option<Self>> {
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::load(&config_path)
                    .with_context(|| format!("invalid config {}", config_path.display()))?;
                return Ok(Some(config));
            }
            if !dir.pop() {
                return Ok(None);
            }
        }
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# Poolbench Configuration

[runner]
# Number of worker processes
workers = 4
# Inputs are 1..=upper_limit
upper_limit = 10000
# Isolation mode: "process" or "thread"
isolation = "process"
# poolApplyAsync runs chunked above this many inputs
async_chunk_threshold = 200000
# Chunk count targeted by the adaptive chunk sizer
target_chunks = 1000
# Draw progress bars on stderr
progress = false

[output]
# Default output format: human, json, csv
format = "human"
# Append every measurement to a CSV file (uncomment to enable)
# csv_path = "results.csv"
"#
        .to_string()
    }
}
