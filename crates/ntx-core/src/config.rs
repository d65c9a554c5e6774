//! # Configuration System
//!
//! YAML-based configuration for the transmitter, covering:
//!
//! - Per-channel tuning (frequency, sample rate, bandwidth, gain, gain-stage
//!   overrides, bias tee)
//! - Stream settings (buffer geometry, transfer timeout, buffer refresh
//!   policy, read-back policy)
//! - Logging configuration
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first source found:
//! 1. Path passed explicitly (`--config`)
//! 2. Path in the `NTX_CONFIG` environment variable
//! 3. `./ntx.yaml` (current directory)
//! 4. Built-in defaults
//!
//! ## Example Configuration
//!
//! ```yaml
//! device: "bladerf://"
//! channels:
//!   - index: 0
//!     frequency_hz: 915000000
//!     gain_db: 60
//!   - index: 1
//!     frequency_hz: 868000000
//!     gain_db: 60
//! stream:
//!   buffer_size_samples: 8192
//!   timeout_ms: 3500
//!   refresh: every_iteration
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::observe::LogConfig;

/// Error type for configuration operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("failed to read config: {0}")]
    Read(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One transmit path: static tuning parameters applied once at startup and
/// read-only while streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Hardware channel index (0 or 1).
    pub index: usize,
    /// Center frequency in Hz.
    pub frequency_hz: u64,
    /// Sample rate in Hz.
    pub sample_rate_hz: u32,
    /// Analog filter bandwidth in Hz.
    pub bandwidth_hz: u32,
    /// Aggregate channel gain in dB.
    pub gain_db: i32,
    /// Explicit per-stage gain values, overriding the stage policy.
    pub gain_stage_overrides: HashMap<String, i32>,
    /// Enable the bias-tee DC output (best effort).
    pub bias_tee: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            index: 0,
            frequency_hz: 915_000_000,
            sample_rate_hz: 5_000_000,
            bandwidth_hz: 2_000_000,
            gain_db: 60,
            gain_stage_overrides: HashMap::new(),
            bias_tee: false,
        }
    }
}

impl ChannelConfig {
    /// Channel at `index` tuned to `frequency_hz`, defaults elsewhere.
    pub fn at(index: usize, frequency_hz: u64) -> Self {
        Self {
            index,
            frequency_hz,
            ..Default::default()
        }
    }
}

/// When the streaming loop regenerates its noise buffers.
///
/// Both variants reflect observed field usage: dual-channel setups
/// regenerate every pass, single-channel setups historically kept a cached
/// buffer and refreshed it with a small per-iteration probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Regenerate every channel's buffer on every loop iteration.
    EveryIteration,
    /// Keep cached buffers; refresh each with `refresh_chance` probability
    /// per iteration.
    Probabilistic { refresh_chance: f64 },
}

impl RefreshPolicy {
    /// Historical refresh probability of the cached single-channel setup.
    pub const DEFAULT_REFRESH_CHANCE: f64 = 0.01;

    /// Probabilistic refresh at the historical 1% rate.
    pub fn probabilistic() -> Self {
        RefreshPolicy::Probabilistic {
            refresh_chance: Self::DEFAULT_REFRESH_CHANCE,
        }
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        RefreshPolicy::EveryIteration
    }
}

/// How frequency/rate/bandwidth read-back values are handled after the
/// hardware coerces a request to a supported step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadbackPolicy {
    /// Log actual values and accept whatever the hardware settled on.
    LogOnly,
    /// Fail configuration when an actual value deviates from the request by
    /// more than `tolerance_ppm` parts per million.
    Enforce { tolerance_ppm: f64 },
}

impl Default for ReadbackPolicy {
    fn default() -> Self {
        // 1% passes normal hardware coercion steps and still catches a tune
        // that landed on the wrong band.
        ReadbackPolicy::Enforce {
            tolerance_ppm: 10_000.0,
        }
    }
}

/// Stream geometry and loop behavior shared by all channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Samples per channel per transfer buffer.
    pub buffer_size_samples: usize,
    /// Number of driver-side buffers.
    pub num_buffers: u32,
    /// Number of in-flight USB transfers.
    pub num_transfers: u32,
    /// Bound on every synchronous transmit call, in milliseconds.
    pub timeout_ms: u32,
    /// Per-iteration CPU yield, in milliseconds.
    pub yield_ms: u64,
    /// Noise-buffer refresh policy.
    pub refresh: RefreshPolicy,
    /// Read-back handling for tuning parameters.
    pub readback: ReadbackPolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            buffer_size_samples: 8192,
            num_buffers: 16,
            num_transfers: 8,
            timeout_ms: 3500,
            yield_ms: 1,
            refresh: RefreshPolicy::default(),
            readback: ReadbackPolicy::default(),
        }
    }
}

impl StreamSettings {
    /// Transmit timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_ms))
    }

    /// Per-iteration yield as a [`Duration`].
    pub fn yield_interval(&self) -> Duration {
        Duration::from_millis(self.yield_ms)
    }
}

/// Top-level transmitter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TxConfig {
    /// Device URI, `driver://args` (e.g. `bladerf://`, `sim://`).
    pub device: String,
    /// Transmit channels, one or two.
    pub channels: Vec<ChannelConfig>,
    /// Stream settings.
    pub stream: StreamSettings,
    /// Logging configuration.
    pub log: LogConfig,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            device: "bladerf://".to_string(),
            channels: vec![ChannelConfig::default()],
            stream: StreamSettings::default(),
            log: LogConfig::default(),
        }
    }
}

impl TxConfig {
    /// Parse a YAML document.
    pub fn from_yaml(s: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration following the documented search path. `path` is
    /// the explicit `--config` value, if any; an explicit path that does not
    /// exist is an error, while a missing default location falls through.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            return Self::read_file(p);
        }
        if let Ok(env_path) = std::env::var("NTX_CONFIG") {
            return Self::read_file(Path::new(&env_path));
        }
        let local = Path::new("ntx.yaml");
        if local.exists() {
            return Self::read_file(local);
        }
        Ok(Self::default())
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }

    /// Enforce the structural invariants the pipeline depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::Invalid("no channels configured".into()));
        }
        if self.channels.len() > 2 {
            return Err(ConfigError::Invalid(format!(
                "{} channels configured; the front end drives at most 2",
                self.channels.len()
            )));
        }
        for ch in &self.channels {
            if ch.index > 1 {
                return Err(ConfigError::Invalid(format!(
                    "channel index {} out of range (0..=1)",
                    ch.index
                )));
            }
            if ch.sample_rate_hz == 0 || ch.bandwidth_hz == 0 || ch.frequency_hz == 0 {
                return Err(ConfigError::Invalid(format!(
                    "channel {}: frequency, sample rate, and bandwidth must be nonzero",
                    ch.index
                )));
            }
        }
        if self.channels.len() == 2 && self.channels[0].index == self.channels[1].index {
            return Err(ConfigError::Invalid(format!(
                "duplicate channel index {}",
                self.channels[0].index
            )));
        }
        if self.stream.buffer_size_samples == 0 {
            return Err(ConfigError::Invalid("buffer_size_samples must be > 0".into()));
        }
        if self.stream.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be > 0".into()));
        }
        if let RefreshPolicy::Probabilistic { refresh_chance } = self.stream.refresh {
            if !(0.0..=1.0).contains(&refresh_chance) {
                return Err(ConfigError::Invalid(format!(
                    "refresh_chance {} outside [0, 1]",
                    refresh_chance
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_front_end_nominals() {
        let s = StreamSettings::default();
        assert_eq!(s.buffer_size_samples, 8192);
        assert_eq!(s.num_buffers, 16);
        assert_eq!(s.num_transfers, 8);
        assert_eq!(s.timeout_ms, 3500);
        let ch = ChannelConfig::default();
        assert_eq!(ch.sample_rate_hz, 5_000_000);
        assert_eq!(ch.bandwidth_hz, 2_000_000);
    }

    #[test]
    fn test_default_config_validates() {
        TxConfig::default().validate().unwrap();
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut cfg = TxConfig::default();
        cfg.channels = vec![
            ChannelConfig::at(0, 1_575_420_000),
            ChannelConfig::at(1, 1_227_600_000),
        ];
        cfg.stream.refresh = RefreshPolicy::probabilistic();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back = TxConfig::from_yaml(&yaml).unwrap();
        assert_eq!(back.channels.len(), 2);
        assert_eq!(back.channels[1].frequency_hz, 1_227_600_000);
        assert_eq!(back.stream.refresh, RefreshPolicy::probabilistic());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let cfg = TxConfig::from_yaml("device: \"sim://\"\n").unwrap();
        assert_eq!(cfg.device, "sim://");
        assert_eq!(cfg.stream.buffer_size_samples, 8192);
        assert_eq!(cfg.channels.len(), 1);
    }

    #[test]
    fn test_validation_rejects_bad_shapes() {
        let mut cfg = TxConfig::default();
        cfg.channels.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = TxConfig::default();
        cfg.channels = vec![ChannelConfig::at(0, 1_000_000_000); 3];
        assert!(cfg.validate().is_err());

        let mut cfg = TxConfig::default();
        cfg.channels = vec![ChannelConfig::at(1, 1_000_000_000), ChannelConfig::at(1, 2_000_000_000)];
        assert!(cfg.validate().is_err());

        let mut cfg = TxConfig::default();
        cfg.channels[0].index = 5;
        assert!(cfg.validate().is_err());

        let mut cfg = TxConfig::default();
        cfg.stream.buffer_size_samples = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = TxConfig::default();
        cfg.stream.refresh = RefreshPolicy::Probabilistic { refresh_chance: 1.5 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let err = TxConfig::load(Some(Path::new("/nonexistent/ntx.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
