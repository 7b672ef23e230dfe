//! Measurement sinks
//!
//! A sink receives one [`RunReport`] per successful run. Failed runs never
//! reach a sink.

use crate::report::{CSV_HEADER, RunReport, csv_row};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors persisting a measurement
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink file could not be opened or written
    #[error("failed to write measurement to {path}: {source}")]
    Io {
        /// File being written
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
}

/// Destination for run reports
pub trait MeasurementSink {
    /// Persist one report
    fn record(&mut self, report: &RunReport) -> Result<(), SinkError>;
}

/// Appends one CSV row per report; the header is written when the file is
/// new or empty
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// Sink appending to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, report: &RunReport) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{CSV_HEADER}")?;
        }
        writeln!(file, "{}", csv_row(report))?;
        file.flush()
    }
}

impl MeasurementSink for CsvSink {
    fn record(&mut self, report: &RunReport) -> Result<(), SinkError> {
        self.append(report).map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Keeps reports in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    reports: Vec<RunReport>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports recorded so far, oldest first
    pub fn reports(&self) -> &[RunReport] {
        &self.reports
    }

    /// Number of recorded reports
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

impl MeasurementSink for MemorySink {
    fn record(&mut self, report: &RunReport) -> Result<(), SinkError> {
        self.reports.push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Measurement;
    use chrono::Utc;

    fn report(strategy: &str) -> RunReport {
        RunReport {
            measurement: Measurement {
                algorithm: "primeChecker".to_string(),
                strategy: strategy.to_string(),
                workers: 2,
                input_size: 100,
                elapsed_secs: 0.5,
            },
            substituted_from: None,
            result_count: 100,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_csv_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results").join("runs.csv");

        let mut sink = CsvSink::new(&path);
        sink.record(&report("poolMap")).unwrap();
        sink.record(&report("poolApply")).unwrap();
        // A fresh sink on the same file keeps appending.
        CsvSink::new(&path).record(&report("singleProcessLoop")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(content.matches(CSV_HEADER).count(), 1);
        assert!(lines[1].contains(",poolMap,"));
        assert!(lines[3].contains(",singleProcessLoop,"));
    }

    #[test]
    fn test_csv_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let mut sink = CsvSink::new(dir.path());
        let err = sink.record(&report("poolMap")).unwrap_err();
        assert!(matches!(err, SinkError::Io { .. }));
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.record(&report("poolMap")).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.reports()[0].measurement.strategy, "poolMap");
    }
}
