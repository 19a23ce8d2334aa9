//! Test suite runner
//!
//! Runs every selected test of a suite in order: load the container, prepare, resolve CPU
//! assignments, execute all slots and aggregate the results into a report line.

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info};

use super::assign::resolve;
use super::cache::ObjectCache;
use super::engine::{execute, ExecutionSettings};
use super::prepare::{check_preparation, prepare};
use crate::config::{self, TestSuite};
use crate::models::TestSpec;
use crate::output::{aggregate, ReportLine};
use crate::probe::ProbeLoader;
use crate::utils::Timer;

/// Run-wide settings, mostly command-line overrides
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Only run tests whose whole name matches
    pub test_filter: Option<Regex>,
    /// Overrides every test's batch size
    pub batch_size: Option<u32>,
    /// Replaces the extension of every container path
    pub extension: Option<String>,
    /// Overrides every test's timed repeat count
    pub repeat_count: Option<u32>,
    /// Number of processor slots
    pub cpu_count: usize,
    /// Demote non-zero return codes to warnings
    pub ignore_failures: bool,
}

impl RunOptions {
    pub fn new(cpu_count: usize) -> Self {
        Self {
            test_filter: None,
            batch_size: None,
            extension: None,
            repeat_count: None,
            cpu_count,
            ignore_failures: false,
        }
    }

    pub fn with_filter(mut self, filter: Regex) -> Self {
        self.test_filter = Some(filter);
        self
    }

    pub fn ignore_failures(mut self, ignore: bool) -> Self {
        self.ignore_failures = ignore;
        self
    }
}

/// Counts of a finished run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: usize,
    pub skipped: usize,
}

/// Runs test suites against one loader, sharing loaded containers across tests
pub struct SuiteRunner<L> {
    cache: ObjectCache<L>,
    options: RunOptions,
    platform: String,
}

impl<L: ProbeLoader> SuiteRunner<L> {
    pub fn new(loader: L, options: RunOptions) -> Self {
        Self {
            cache: ObjectCache::new(loader),
            options,
            platform: config::current_platform().to_string(),
        }
    }

    /// Override the platform tests are filtered against
    #[cfg(test)]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    #[cfg(test)]
    pub fn cache(&self) -> &ObjectCache<L> {
        &self.cache
    }

    /// Whether `test` passes the platform and name filters
    pub fn should_run(&self, test: &TestSpec) -> bool {
        if !config::platform_matches(test.platform_filter.as_deref(), &self.platform) {
            debug!("Skipping {}: not for platform {}", test.name, self.platform);
            return false;
        }
        if let Some(filter) = &self.options.test_filter {
            if !filter.is_match(&test.name) {
                debug!("Skipping {}: does not match filter", test.name);
                return false;
            }
        }
        true
    }

    /// Run one test and return its report line
    pub fn run_test(&mut self, test: &TestSpec) -> Result<ReportLine> {
        let timer = Timer::start(format!("Test {}", test.name));
        let ignore_failures = self.options.ignore_failures;
        let batch_size = self
            .options
            .batch_size
            .unwrap_or_else(|| test.batch_size_or_default());

        let path = config::container_path(&test.container_path, self.options.extension.as_deref());
        let container = self
            .cache
            .get_or_load(&path, test.probe_category.as_deref())?;

        if let Some(preparation) = &test.preparation {
            let outcome = prepare(container.as_ref(), preparation, batch_size)
                .with_context(|| format!("Preparation failed in test {}", test.name))?;
            check_preparation(&test.name, preparation, &outcome, ignore_failures)
                .with_context(|| format!("Preparation failed in test {}", test.name))?;
        }

        let slots = resolve(
            &test.assignment,
            |name| container.find_probe(name),
            self.options.cpu_count,
        )
        .with_context(|| format!("Invalid CPU assignment in test {}", test.name))?;

        let settings = ExecutionSettings {
            repeat_count: self.options.repeat_count.unwrap_or(test.repeat_count),
            batch_size,
        };
        info!(
            "Running {} on {}/{} CPUs ({} repetitions, batch {})",
            test.name,
            slots.bound_count(),
            slots.len(),
            settings.repeat_count,
            settings.batch_size
        );

        let results = execute(&slots, settings)
            .with_context(|| format!("Execution failed in test {}", test.name))?;
        let line = aggregate(&test.name, &results, ignore_failures)?;

        timer.stop();
        Ok(line)
    }

    /// Run every selected test in order, handing each report line to `emit` as soon as
    /// the test completes. The first fatal error stops the run.
    pub fn run_suite<F>(&mut self, suite: &TestSuite, mut emit: F) -> Result<RunSummary>
    where
        F: FnMut(&ReportLine) -> Result<()>,
    {
        let mut summary = RunSummary::default();

        for test in &suite.tests {
            if !self.should_run(test) {
                summary.skipped += 1;
                continue;
            }

            let line = self.run_test(test)?;
            emit(&line)?;
            summary.executed += 1;
        }

        info!(
            "Run completed: {} executed, {} skipped, {} containers loaded",
            summary.executed,
            summary.skipped,
            self.cache.len()
        );
        Ok(summary)
    }
}
