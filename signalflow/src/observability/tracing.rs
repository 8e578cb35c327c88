//! Subscriber installation and span timing.

use anyhow::{anyhow, Context, Result};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Installs a global `tracing` subscriber configured by `config`.
///
/// `RUST_LOG`, when set, takes precedence over `config.filter`.
///
/// # Errors
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .with_context(|| format!("invalid log filter '{}'", config.filter))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

/// Measures the wall-clock duration of a stage or job.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// The timer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the timer, returning the duration in milliseconds.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}
