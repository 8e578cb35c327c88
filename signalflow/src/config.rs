//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::PipelineError;

/// Environment variable overriding [`PipelineConfig::max_workers`].
pub const ENV_MAX_WORKERS: &str = "SIGNALFLOW_MAX_WORKERS";
/// Environment variable setting [`PipelineConfig::cache_dir`].
pub const ENV_CACHE_DIR: &str = "SIGNALFLOW_CACHE_DIR";
/// Environment variable overriding [`LogConfig::filter`].
pub const ENV_LOG: &str = "SIGNALFLOW_LOG";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive string.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "signalflow=info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

/// Configuration for a [`HeatmapPipeline`](crate::pipeline::HeatmapPipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of jobs computing at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Directory for the persistent artifact store. In-memory when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

fn default_max_workers() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            cache_dir: None,
            log: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker pool size.
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Persists artifacts under `dir`.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Sets the logging settings.
    #[must_use]
    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Defaults overridden by `SIGNALFLOW_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_WORKERS) {
            config.max_workers = raw.trim().parse().map_err(|_| {
                PipelineError::invalid_configuration(format!(
                    "{ENV_MAX_WORKERS} must be a positive integer, got '{raw}'"
                ))
            })?;
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|d| !d.is_empty()) {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(filter) = lookup(ENV_LOG) {
            config.log.filter = filter;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a zero worker count.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_workers == 0 {
            return Err(PipelineError::invalid_configuration(
                "max_workers must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.max_workers >= 1);
        assert!(config.cache_dir.is_none());
        assert_eq!(config.log.filter, "signalflow=info");
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"cache_dir": "/tmp/sf"}"#).unwrap();
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/sf")));
        assert_eq!(config.max_workers, default_max_workers());
        assert!(!config.log.json);
    }

    #[test]
    fn test_from_lookup() {
        let config = PipelineConfig::from_lookup(lookup(&[
            (ENV_MAX_WORKERS, "3"),
            (ENV_CACHE_DIR, "/var/cache/sf"),
            (ENV_LOG, "signalflow=debug"),
        ]))
        .unwrap();

        assert_eq!(config.max_workers, 3);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/var/cache/sf")));
        assert_eq!(config.log.filter, "signalflow=debug");
    }

    #[test]
    fn test_from_lookup_rejects_bad_workers() {
        assert!(PipelineConfig::from_lookup(lookup(&[(ENV_MAX_WORKERS, "lots")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[(ENV_MAX_WORKERS, "0")])).is_err());
    }

    #[test]
    fn test_builder_setters() {
        let config = PipelineConfig::new()
            .with_max_workers(2)
            .with_cache_dir("/tmp/x")
            .with_log(LogConfig {
                filter: "warn".into(),
                json: true,
            });
        assert_eq!(config.max_workers, 2);
        assert!(config.log.json);
    }
}
