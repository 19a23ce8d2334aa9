//! Data models for probe benchmarking
//!
//! This module contains the data structures shared by configuration, execution and reporting.

mod slot;
mod test_spec;

pub use slot::{SlotMap, SlotResult};
pub use test_spec::{AssignmentDirective, Preparation, ProbeAssignment, TestSpec};
