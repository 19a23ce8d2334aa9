//! Timestamped results file
//!
//! Appends one `Timestamp,Test,Average Duration (ns)` row per executed test so runs can be
//! collected and compared later.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::debug;

use super::ReportLine;

#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Test")]
    test: &'a str,
    #[serde(rename = "Average Duration (ns)")]
    average_duration_ns: u64,
}

/// CSV results file, created on first write
#[derive(Clone, Debug)]
pub struct ResultsFile {
    path: PathBuf,
}

impl ResultsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append a row for `line`; lines without bound slots are skipped
    pub fn append(&self, line: &ReportLine, timestamp: DateTime<Utc>) -> Result<()> {
        let Some(average_duration_ns) = line.mean_duration_ns() else {
            debug!("No durations for {}, skipping results row", line.test);
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open results file: {}", self.path.display()))?;
        let is_new = file
            .metadata()
            .with_context(|| format!("Failed to stat results file: {}", self.path.display()))?
            .len()
            == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer
            .serialize(HistoryRow {
                timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                test: &line.test,
                average_duration_ns,
            })
            .with_context(|| format!("Failed to write results file: {}", self.path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to write results file: {}", self.path.display()))?;

        Ok(())
    }
}
