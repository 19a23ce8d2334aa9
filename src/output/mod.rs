//! Report output
//!
//! Provides result aggregation, CSV report lines and the results history file.

mod history;
mod report;

pub use history::ResultsFile;
pub use report::{aggregate, ReportLine, ReportWriter, TestFailure};
