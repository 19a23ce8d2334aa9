//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::Parser;

/// Per-CPU probe benchmark runner
#[derive(Parser, Debug)]
#[command(name = "probe-bench")]
#[command(version)]
#[command(about = "Run probe benchmarks pinned to every CPU and report per-CPU durations")]
#[command(long_about = None)]
pub struct Args {
    /// Test suite file (YAML or JSON)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<String>,

    /// Only run tests whose name fully matches this regex
    #[arg(short, long, value_name = "REGEX")]
    pub test: Option<String>,

    /// Override the batch size of every test
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub batch_size: Option<u32>,

    /// Replace the extension of every container path (e.g. .sys)
    #[arg(short, long, value_name = "EXT")]
    pub extension: Option<String>,

    /// Override the timed repeat count of every test
    #[arg(short = 'c', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat_count: Option<u32>,

    /// Number of processor slots (defaults to the possible CPUs)
    #[arg(short = 'p', long, value_name = "N", value_parser = parse_cpu_count)]
    pub cpu_count: Option<usize>,

    /// Report non-zero return codes as warnings instead of failing
    #[arg(short = 'r', long)]
    pub ignore_return_code: bool,

    /// Append timestamped averages to this CSV file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

fn parse_cpu_count(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
