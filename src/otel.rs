//! Structured logging setup.
//!
//! `tracing-subscriber` with an `EnvFilter`, a JSON or pretty fmt layer, an
//! optional sampling layer, and optional non-blocking output through
//! `tracing-appender`. Configured from `RAZOR_LOG_*` environment variables or
//! the `logging` section of the runtime configuration file.

use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{Level, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Which events are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingMode {
    #[default]
    All,
    /// Only WARN and ERROR.
    ErrorOnly,
    /// Every WARN and ERROR, a `sampling_rate` share of the rest.
    Sampled,
}

impl SamplingMode {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "error-only" | "error_only" => SamplingMode::ErrorOnly,
            "sampled" => SamplingMode::Sampled,
            _ => SamplingMode::All,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_sampling_rate() -> f64 {
    1.0
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// trace/debug/info/warn/error; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub sampling_mode: SamplingMode,
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    /// Write through a background thread (`tracing-appender`).
    #[serde(default)]
    pub non_blocking: bool,
    /// Extra comma-separated filter directives, e.g. `razor::router=debug`.
    #[serde(default)]
    pub target_filter: Option<String>,
    /// Include file:line (dev only).
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            sampling_mode: SamplingMode::default(),
            sampling_rate: default_sampling_rate(),
            non_blocking: false,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Defaults overridden by `RAZOR_LOG_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Ok(level) = env::var("RAZOR_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(format) = env::var("RAZOR_LOG_FORMAT") {
            self.format = LogFormat::parse(&format);
        }
        if let Ok(mode) = env::var("RAZOR_LOG_SAMPLING_MODE") {
            self.sampling_mode = SamplingMode::parse(&mode);
        }
        if let Some(rate) = env_value::<f64>("RAZOR_LOG_SAMPLING_RATE") {
            self.sampling_rate = rate;
        }
        if let Some(non_blocking) = env_value::<bool>("RAZOR_LOG_NON_BLOCKING") {
            self.non_blocking = non_blocking;
        }
        if let Ok(filter) = env::var("RAZOR_LOG_TARGET_FILTER") {
            self.target_filter = Some(filter);
        }
        if let Some(location) = env_value::<bool>("RAZOR_LOG_INCLUDE_LOCATION") {
            self.include_location = location;
        }
    }

    /// Pretty, debug-level, unsampled.
    pub fn dev() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            include_location: true,
            ..Self::default()
        }
    }

    fn level(&self) -> Level {
        Level::from_str(self.level.trim()).unwrap_or(Level::INFO)
    }
}

fn env_value<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Sampling layer: decides whether an event is emitted.
pub struct SamplingLayer {
    mode: SamplingMode,
    interval: u64,
    counter: AtomicU64,
}

impl SamplingLayer {
    pub fn new(mode: SamplingMode, sampling_rate: f64) -> Self {
        let rate = sampling_rate.clamp(0.0, 1.0);
        let interval = if rate > 0.0 {
            // rate is in (0, 1], so 1/rate is at least 1
            (1.0 / rate).round() as u64
        } else {
            0
        };
        Self {
            mode,
            interval,
            counter: AtomicU64::new(0),
        }
    }

    fn should_sample(&self, metadata: &Metadata<'_>) -> bool {
        let important = matches!(*metadata.level(), Level::WARN | Level::ERROR);
        match self.mode {
            SamplingMode::All => true,
            SamplingMode::ErrorOnly => important,
            SamplingMode::Sampled => {
                if important || !metadata.is_event() {
                    return true;
                }
                let count = self.counter.fetch_add(1, Ordering::Relaxed);
                self.interval > 0 && count % self.interval == 0
            }
        }
    }
}

impl<S> Layer<S> for SamplingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: LayerContext<'_, S>) -> bool {
        self.should_sample(metadata)
    }
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level().as_str()));
    if let Some(targets) = &config.target_filter {
        for directive in targets.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            match directive.parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(_) => eprintln!("Warning: invalid log filter directive: {directive}"),
            }
        }
    }
    filter
}

/// Install the global subscriber.
///
/// With `non_blocking` set, the returned guard must be kept alive for the
/// lifetime of the program; dropping it flushes and stops the writer thread.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(SamplingLayer::new(config.sampling_mode, config.sampling_rate));

    let (writer, guard) = if config.non_blocking {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(writer), Some(guard))
    } else {
        (
            tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stdout),
            None,
        )
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    registry
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_helpers() {
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Json);
        assert_eq!(SamplingMode::parse("error_only"), SamplingMode::ErrorOnly);
        assert_eq!(SamplingMode::parse("sampled"), SamplingMode::Sampled);
        assert_eq!(SamplingMode::parse(""), SamplingMode::All);
    }

    #[test]
    fn test_config_from_yaml() {
        let config: LogConfig =
            serde_yaml::from_str("level: debug\nformat: pretty\nsampling_mode: error-only\n")
                .unwrap();
        assert_eq!(config.level(), Level::DEBUG);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.sampling_mode, SamplingMode::ErrorOnly);
        assert!(!config.non_blocking);
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let config = LogConfig {
            level: "chatty".to_string(),
            ..LogConfig::default()
        };
        assert_eq!(config.level(), Level::INFO);
    }

    #[test]
    fn test_sampling_interval() {
        assert_eq!(SamplingLayer::new(SamplingMode::Sampled, 0.1).interval, 10);
        assert_eq!(SamplingLayer::new(SamplingMode::Sampled, 0.0).interval, 0);
        assert_eq!(SamplingLayer::new(SamplingMode::Sampled, 5.0).interval, 1);
    }
}
