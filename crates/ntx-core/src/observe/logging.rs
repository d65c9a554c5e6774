//! # Structured Logging
//!
//! Logging via the `tracing` ecosystem: an [`EnvFilter`]-driven subscriber
//! with plain or JSON output. `RUST_LOG` takes precedence over the
//! configured level, so a run can always be made more verbose without
//! touching configuration.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ntx_core::observe::{init_logging, LogConfig, LogLevel};
//!
//! let mut config = LogConfig::default();
//! config.level = LogLevel::Debug;
//! init_logging(&config);
//!
//! tracing::info!(channel = 0, freq_hz = 915_000_000u64, "channel configured");
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Plain,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level to emit.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Include timestamps.
    pub timestamps: bool,
    /// Explicit filter directive (e.g. `"ntx_sdr=debug"`); overrides `level`.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Plain,
            timestamps: true,
            filter: None,
        }
    }
}

/// Install the global subscriber. Call once at startup; later calls (or a
/// subscriber installed by a test harness) are silently ignored.
pub fn init_logging(config: &LogConfig) {
    let make_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| match &config.filter {
            Some(custom) => {
                EnvFilter::try_new(custom).unwrap_or_else(|_| EnvFilter::new(config.level.to_string()))
            }
            None => EnvFilter::new(config.level.to_string()),
        })
    };

    let result = match (config.format, config.timestamps) {
        (LogFormat::Plain, true) => tracing_subscriber::fmt()
            .with_env_filter(make_filter())
            .compact()
            .try_init(),
        (LogFormat::Plain, false) => tracing_subscriber::fmt()
            .with_env_filter(make_filter())
            .compact()
            .without_time()
            .try_init(),
        (LogFormat::Json, true) => tracing_subscriber::fmt()
            .with_env_filter(make_filter())
            .json()
            .try_init(),
        (LogFormat::Json, false) => tracing_subscriber::fmt()
            .with_env_filter(make_filter())
            .json()
            .without_time()
            .try_init(),
    };
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_display_and_parse() {
        for level in [LogLevel::Trace, LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
        }
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LogConfig::default();
        init_logging(&config);
        init_logging(&config);
    }
}
