//! probe-bench - per-CPU probe benchmark runner
//!
//! Loads probe containers named by a test suite, runs each test's probes pinned to every
//! assigned CPU at once and prints one CSV line per test with the average duration per CPU.
//!
//! ## Usage
//!
//! ```bash
//! # Run every test in the suite
//! probe-bench --input tests.yaml
//!
//! # Run matching tests on 4 CPUs, tolerating non-zero return codes
//! probe-bench -i tests.yaml -t 'lookup.*' -p 4 -r
//!
//! # Keep a timestamped history of averages
//! probe-bench -i tests.yaml --output results.csv
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};

mod cli;
mod config;
mod executor;
mod models;
mod output;
mod probe;
mod utils;

use cli::Args;
use config::{compile_test_filter, ConfigError, EnvConfig, TestSuite};
use executor::{RunOptions, SuiteRunner};
use output::{ReportWriter, ResultsFile};
use probe::{affinity, NativeLoader};
use utils::{init_logger, LogLevel};

fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let level = LogLevel::resolve(
        args.log_level.as_deref().or(env.log_level.as_deref()),
        args.verbose,
    );
    init_logger(level);
    if env.has_any() {
        debug!("Environment overrides: {:?}", env);
    }

    let suite_path = resolve_suite_path(&args, &env)?;
    info!("Loading test suite from {}", suite_path.display());
    let suite = TestSuite::load(&suite_path)?;

    let options = run_options(&args, &env)?;
    info!("Running on {} CPUs", options.cpu_count);

    let results_file = args.output.as_deref().map(ResultsFile::new);
    let mut report = ReportWriter::new(std::io::stdout().lock());
    let mut runner = SuiteRunner::new(NativeLoader::new(), options);

    let summary = runner.run_suite(&suite, |line| {
        report
            .write_line(line)
            .context("Failed to write report line")?;
        if let Some(results) = &results_file {
            results.append(line, Utc::now())?;
        }
        Ok(())
    })?;

    if summary.executed == 0 {
        info!("No tests matched the current platform and filter");
    }

    Ok(())
}

/// Suite file from the command line, the environment or the default locations
fn resolve_suite_path(args: &Args, env: &EnvConfig) -> Result<PathBuf, ConfigError> {
    if let Some(path) = args.input.as_ref().or(env.config_file.as_ref()) {
        return Ok(PathBuf::from(path));
    }
    TestSuite::find().ok_or(ConfigError::NotFound)
}

fn run_options(args: &Args, env: &EnvConfig) -> Result<RunOptions> {
    let cpu_count = args
        .cpu_count
        .or(env.cpu_count.filter(|&n| n > 0))
        .unwrap_or_else(affinity::possible_cpus);

    let mut options = RunOptions::new(cpu_count)
        .ignore_failures(args.ignore_return_code || env.ignore_return_code.unwrap_or(false));
    if let Some(pattern) = &args.test {
        options = options.with_filter(compile_test_filter(pattern)?);
    }
    options.batch_size = args.batch_size;
    options.repeat_count = args.repeat_count;
    options.extension = args.extension.clone();

    Ok(options)
}
