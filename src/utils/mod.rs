//! Shared utilities

mod logger;
mod timer;

#[cfg(test)]
pub use logger::capture_logs;
pub use logger::{init_logger, LogLevel};
pub use timer::Timer;
