//! Environment variable configuration
//!
//! Provides fallbacks for options the command line leaves unset.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "PROBE_BENCH";

/// Settings read from `PROBE_BENCH_*` variables
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// Suite file from PROBE_BENCH_CONFIG
    pub config_file: Option<String>,
    /// Processor count from PROBE_BENCH_CPU_COUNT
    pub cpu_count: Option<usize>,
    /// Failure policy from PROBE_BENCH_IGNORE_RETURN_CODE
    pub ignore_return_code: Option<bool>,
    /// Log level from PROBE_BENCH_LOG
    pub log_level: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            config_file: get_env("CONFIG"),
            cpu_count: get_env_parse("CPU_COUNT"),
            ignore_return_code: get_env_bool("IGNORE_RETURN_CODE"),
            log_level: get_env("LOG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.config_file.is_some()
            || self.cpu_count.is_some()
            || self.ignore_return_code.is_some()
            || self.log_level.is_some()
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Restores environment variables on drop
    struct EnvGuard {
        previous: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&str, &str)]) -> Self {
            let previous = vars
                .iter()
                .map(|(name, value)| {
                    let key = format!("{ENV_PREFIX}_{name}");
                    let old = env::var(&key).ok();
                    env::set_var(&key, value);
                    (key, old)
                })
                .collect();
            Self { previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.previous {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(config.config_file.is_none());
        assert!(!config.has_any());
    }

    #[test]
    fn test_env_config_load() {
        let _guard = EnvGuard::set(&[
            ("CONFIG", "suite.yaml"),
            ("CPU_COUNT", " 6 "),
            ("IGNORE_RETURN_CODE", "yes"),
            ("LOG", "debug"),
        ]);

        let config = EnvConfig::load();
        assert_eq!(
            config,
            EnvConfig {
                config_file: Some("suite.yaml".to_string()),
                cpu_count: Some(6),
                ignore_return_code: Some(true),
                log_level: Some("debug".to_string()),
            }
        );
        assert!(config.has_any());
    }
}
