//! Run reports and their output formats

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timing record of one successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Computation name
    pub algorithm: String,
    /// Strategy that actually ran
    pub strategy: String,
    /// Worker count
    pub workers: usize,
    /// Number of inputs
    pub input_size: usize,
    /// Wall-clock seconds around dispatch, pool teardown included
    pub elapsed_secs: f64,
}

impl Measurement {
    /// `"<algorithm> took <secs>s for <N> numbers using <strategy>"`, with
    /// seconds rounded to 5 decimals
    pub fn human_line(&self) -> String {
        format!(
            "{} took {:.5}s for {} numbers using {}",
            self.algorithm, self.elapsed_secs, self.input_size, self.strategy
        )
    }
}

/// Everything known about one finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// The timing record
    pub measurement: Measurement,
    /// The strategy asked for, when the harness replaced it
    pub substituted_from: Option<String>,
    /// Number of results the strategy returned
    pub result_count: usize,
    /// When the run finished
    pub recorded_at: DateTime<Utc>,
}

impl RunReport {
    /// Strategy name the caller requested
    pub fn requested_strategy(&self) -> &str {
        self.substituted_from
            .as_deref()
            .unwrap_or(&self.measurement.strategy)
    }
}

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One line per run
    #[default]
    Human,
    /// Pretty JSON report
    Json,
    /// CSV header and one row
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

/// CSV column names, in row order
pub const CSV_HEADER: &str =
    "recorded_at,algorithm,strategy,requested_strategy,workers,input_size,elapsed_secs";

/// One CSV row (no trailing newline)
pub fn csv_row(report: &RunReport) -> String {
    let m = &report.measurement;
    [
        report.recorded_at.to_rfc3339(),
        escape_csv(&m.algorithm),
        escape_csv(&m.strategy),
        escape_csv(report.requested_strategy()),
        m.workers.to_string(),
        m.input_size.to_string(),
        format!("{:.9}", m.elapsed_secs),
    ]
    .join(",")
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render a report in the requested format
pub fn format_report(report: &RunReport, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Human => {
            let mut out = report.measurement.human_line();
            if let Some(requested) = &report.substituted_from {
                out.push_str(&format!(" (requested {requested})"));
            }
            Ok(out)
        }
        OutputFormat::Json => serde_json::to_string_pretty(report),
        OutputFormat::Csv => Ok(format!("{CSV_HEADER}\n{}", csv_row(report))),
    }
}
