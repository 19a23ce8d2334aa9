//! Result aggregation and report lines
//!
//! One CSV line per test: the test name followed by the average duration of every bound
//! slot in ascending CPU order.

use std::fmt;
use std::io::Write;
use thiserror::Error;
use tracing::warn;

use crate::models::SlotResult;

/// A probe returned non-zero on one of the test's CPUs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("probe returned non-zero {return_code} on CPU {slot} in test {test}")]
pub struct TestFailure {
    pub test: String,
    pub slot: usize,
    pub return_code: i32,
}

/// Summary of one executed test
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportLine {
    pub test: String,
    /// (slot, average duration in ns), ascending by slot
    pub durations: Vec<(usize, u64)>,
}

impl ReportLine {
    /// CSV fields of the line
    pub fn record(&self) -> Vec<String> {
        std::iter::once(self.test.clone())
            .chain(self.durations.iter().map(|(_, d)| d.to_string()))
            .collect()
    }

    /// Mean duration across bound slots
    pub fn mean_duration_ns(&self) -> Option<u64> {
        if self.durations.is_empty() {
            return None;
        }
        let total: u128 = self.durations.iter().map(|(_, d)| u128::from(*d)).sum();
        Some((total / self.durations.len() as u128) as u64)
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.record().join(","))
    }
}

/// Check every slot result and build the test's report line.
///
/// With `ignore_failures` each non-zero return code is logged as a warning and the line is
/// still produced; otherwise the lowest failing slot fails the test.
pub fn aggregate(
    test: &str,
    results: &[Option<SlotResult>],
    ignore_failures: bool,
) -> Result<ReportLine, TestFailure> {
    for (slot, result) in results.iter().enumerate() {
        let Some(result) = result else { continue };
        if result.is_success() {
            continue;
        }

        let failure = TestFailure {
            test: test.to_string(),
            slot,
            return_code: result.return_code,
        };
        if !ignore_failures {
            return Err(failure);
        }
        warn!("{}", failure);
    }

    Ok(ReportLine {
        test: test.to_string(),
        durations: results
            .iter()
            .enumerate()
            .filter_map(|(slot, r)| r.map(|r| (slot, r.duration_ns)))
            .collect(),
    })
}

/// Writes report lines as CSV records, flushing after each line.
///
/// Fields are never quoted, so each line is exactly the `Display` form of the report line.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(inner: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(inner);
        Self { writer }
    }

    pub fn write_line(&mut self, line: &ReportLine) -> csv::Result<()> {
        self.writer.write_record(line.record())?;
        self.writer.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer.into_inner().map_err(|e| e.into_error()).unwrap()
    }
}
