//! # Runtime Configuration Module
//!
//! Worker pool and logging settings, from a YAML file and/or environment
//! variables. Environment variables always win over the file.
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |---|---|
//! | `RAZOR_WORKERS` | `pool.workers` |
//! | `RAZOR_QUEUE_BOUND` | `pool.queue_bound` |
//! | `RAZOR_BACKPRESSURE_MODE` | `pool.backpressure_mode` (`block` / `shed`) |
//! | `RAZOR_BACKPRESSURE_TIMEOUT_MS` | `pool.backpressure_timeout_ms` |
//! | `RAZOR_STACK_SIZE` | `pool.stack_size` (decimal or `0x` hex) |
//! | `RAZOR_LOG_*` | `logging.*`, see [`LogConfig`] |
//!
//! ## File Format
//!
//! ```yaml
//! pool:
//!   workers: 8
//!   queue_bound: 256
//!   backpressure_mode: shed
//!   stack_size: 0x40000
//! logging:
//!   level: debug
//!   format: pretty
//! ```
//!
//! `stack_size` may be written as a YAML hex integer.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::otel::LogConfig;
use crate::worker_pool::WorkerPoolConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub pool: WorkerPoolConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

impl RuntimeConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Parse YAML, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).context("Invalid runtime configuration")
    }

    /// Read a YAML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read runtime config {}", path.display()))?;
        let mut config = Self::from_yaml(&raw)
            .with_context(|| format!("Failed to parse runtime config {}", path.display()))?;
        config.apply_env();
        info!(
            path = %path.display(),
            workers = config.pool.workers,
            queue_bound = config.pool.queue_bound,
            "Runtime configuration loaded"
        );
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.pool.apply_env();
        self.logging.apply_env();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker_pool::BackpressureMode;

    #[test]
    fn test_from_yaml_fills_defaults() {
        let config = RuntimeConfig::from_yaml("pool:\n  queue_bound: 16\n").unwrap();
        assert_eq!(config.pool.queue_bound, 16);
        assert_eq!(config.pool.backpressure_mode, BackpressureMode::Block);
        assert_eq!(config.logging, LogConfig::default());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(RuntimeConfig::from_yaml("  \n").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(RuntimeConfig::from_yaml("pool: [1, 2").is_err());
    }
}
