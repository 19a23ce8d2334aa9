//! Configuration module
//!
//! Loads the test suite file and resolves per-test paths and platform filters.

mod env;

pub use env::EnvConfig;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::TestSpec;

/// Suite file locations tried when none is given (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./probe-bench.yaml",
    "./probe-bench.yml",
    "~/.config/probe-bench/tests.yaml",
];

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("invalid config file - tests must be a non-empty sequence")]
    NoTests,

    #[error("invalid test {test}: {reason}")]
    InvalidTest { test: String, reason: String },

    #[error("invalid test name filter {pattern}: {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no test suite given and none found in the default locations")]
    NotFound,
}

/// Root of a suite file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestSuite {
    pub tests: Vec<TestSpec>,
}

impl TestSuite {
    #[cfg(test)]
    pub fn new(tests: Vec<TestSpec>) -> Self {
        Self { tests }
    }

    /// Find a suite file in the standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load and validate a suite file; YAML by extension, JSON otherwise
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let suite = Self::parse(&content, is_yaml_file(path)).map_err(|reason| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                reason,
            }
        })?;
        suite.validate()?;
        Ok(suite)
    }

    fn parse(content: &str, yaml: bool) -> Result<Self, String> {
        if yaml {
            serde_yaml::from_str(content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(content).map_err(|e| e.to_string())
        }
    }

    /// Validate suite-wide invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tests.is_empty() {
            return Err(ConfigError::NoTests);
        }

        let mut names = HashSet::new();
        for test in &self.tests {
            let invalid = |reason: &str| ConfigError::InvalidTest {
                test: test.name.clone(),
                reason: reason.to_string(),
            };

            if !names.insert(test.name.as_str()) {
                return Err(invalid("duplicate test name"));
            }
            if test.repeat_count == 0 {
                return Err(invalid("repeat_count must be greater than zero"));
            }
            if test.batch_size == Some(0) {
                return Err(invalid("batch_size must be greater than zero"));
            }
            if test.assignment.is_empty() {
                return Err(invalid("assignment must name at least one probe"));
            }
            if let Some(preparation) = &test.preparation {
                if preparation.repeat_count == 0 {
                    return Err(invalid("preparation repeat_count must be greater than zero"));
                }
            }
        }

        Ok(())
    }
}

/// Platform name tests filter on
pub fn current_platform() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "windows" => "Windows",
        "macos" => "macOS",
        other => other,
    }
}

/// Whether a test restricted to `filter` runs on `platform`
pub fn platform_matches(filter: Option<&str>, platform: &str) -> bool {
    filter.map_or(true, |f| f.eq_ignore_ascii_case(platform))
}

/// Compile a test name filter that must match the whole name
pub fn compile_test_filter(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| ConfigError::InvalidFilter {
        pattern: pattern.to_string(),
        source,
    })
}

/// Resolve a test's container path, replacing its extension when an override is given.
///
/// The override replaces everything from the last `.` of the file name (`probe.o` with
/// `.sys` becomes `probe.sys`); a file name without a `.` gets the override appended.
pub fn container_path(path: &str, extension_override: Option<&str>) -> PathBuf {
    let path = match extension_override {
        Some(extension) => {
            let name_start = path.rfind(|c: char| c == '/' || c == '\\').map_or(0, |i| i + 1);
            let stem = path[name_start..]
                .rfind('.')
                .map_or(path, |dot| &path[..name_start + dot]);
            format!("{stem}{extension}")
        }
        None => path.to_string(),
    };
    expand_path(&path)
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssignmentDirective;
    use tempfile::tempdir;

    const SUITE: &str = r#"
tests:
  - name: baseline
    container_path: baseline.yaml
    repeat_count: 1000
    assignment:
      baseline: all
  - name: mixed
    elf_file: maps.o
    iteration_count: 10
    program_cpu_assignment:
      read: 0
      update: remaining
"#;

    #[test]
    fn test_load_yaml_suite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("suite.yaml");
        std::fs::write(&path, SUITE).unwrap();

        let suite = TestSuite::load(&path).unwrap();
        assert_eq!(suite.tests.len(), 2);
        assert_eq!(suite.tests[1].container_path, "maps.o");
        assert_eq!(
            suite.tests[1].assignment[1].directive,
            AssignmentDirective::Remaining
        );
    }

    #[test]
    fn test_load_json_suite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("suite.json");
        std::fs::write(
            &path,
            r#"{"tests": [{"name": "j", "container_path": "p.yaml", "repeat_count": 5,
                "assignment": {"a": [0, 1], "b": "unassigned"}}]}"#,
        )
        .unwrap();

        let suite = TestSuite::load(&path).unwrap();
        assert_eq!(
            suite.tests[0].assignment[0].directive,
            AssignmentDirective::SlotList(vec![0, 1])
        );
    }

    #[test]
    fn test_empty_assignment_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("suite.yaml");
        std::fs::write(
            &path,
            "tests:\n  - { name: idle, container_path: p.yaml, repeat_count: 1, assignment: {} }\n",
        )
        .unwrap();

        let err = TestSuite::load(&path).unwrap_err();
        assert!(err.to_string().contains("at least one probe"));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();

        let missing = TestSuite::load(dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));

        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "tests: 3").unwrap();
        assert!(matches!(
            TestSuite::load(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));

        std::fs::write(&path, "tests: []").unwrap();
        assert!(matches!(
            TestSuite::load(&path).unwrap_err(),
            ConfigError::NoTests
        ));
    }

    #[test]
    fn test_validate() {
        let valid = TestSpec::new("a", "p.yaml", 1).assign("x", AssignmentDirective::All);
        assert!(TestSuite::new(vec![valid.clone()]).validate().is_ok());

        let duplicate = TestSuite::new(vec![valid.clone(), valid.clone()]);
        assert!(duplicate.validate().is_err());

        let mut zero_repeat = valid.clone();
        zero_repeat.repeat_count = 0;
        assert!(TestSuite::new(vec![zero_repeat]).validate().is_err());

        let no_assignment = TestSpec::new("b", "p.yaml", 1);
        assert!(matches!(
            TestSuite::new(vec![no_assignment]).validate(),
            Err(ConfigError::InvalidTest { test, .. }) if test == "b"
        ));

        let zero_prep = valid.with_preparation("warmup", 0);
        assert!(TestSuite::new(vec![zero_prep]).validate().is_err());
    }

    #[test]
    fn test_demo_suite_is_valid() {
        let suite =
            TestSuite::load(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/tests.yaml")).unwrap();
        assert_eq!(suite.tests.len(), 5);
        assert_eq!(suite.tests[4].platform_filter.as_deref(), Some("Linux"));
    }

    #[test]
    fn test_platform_matches() {
        assert!(platform_matches(None, "Linux"));
        assert!(platform_matches(Some("Linux"), "Linux"));
        assert!(platform_matches(Some("linux"), "Linux"));
        assert!(!platform_matches(Some("Windows"), "Linux"));
    }

    #[test]
    fn test_filter_matches_whole_name() {
        let filter = compile_test_filter("lookup").unwrap();
        assert!(filter.is_match("lookup"));
        assert!(!filter.is_match("lookup_hash"));
        assert!(!filter.is_match("fast_lookup"));

        let filter = compile_test_filter("lookup|update_.*").unwrap();
        assert!(filter.is_match("lookup"));
        assert!(filter.is_match("update_hash"));

        assert!(compile_test_filter("(").is_err());
    }

    #[test]
    fn test_container_path_extension_override() {
        assert_eq!(container_path("probes.o", None), PathBuf::from("probes.o"));
        assert_eq!(
            container_path("build/probes.o", Some(".sys")),
            PathBuf::from("build/probes.sys")
        );
        assert_eq!(container_path("probes", Some(".yaml")), PathBuf::from("probes.yaml"));
        assert_eq!(
            container_path("./build.d/probes", Some(".sys")),
            PathBuf::from("./build.d/probes.sys")
        );
    }

    #[test]
    fn test_expand_path() {
        let path = expand_path("./test.yaml");
        assert_eq!(path, PathBuf::from("./test.yaml"));
    }
}
