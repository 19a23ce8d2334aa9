//! Benchmark execution
//!
//! Loads probe containers, prepares them, binds probes to processor slots and runs every
//! bound slot on its own pinned worker thread.

mod assign;
mod cache;
mod engine;
mod prepare;
mod runner;

pub use runner::{RunOptions, SuiteRunner};
