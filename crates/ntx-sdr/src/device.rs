//! SDR device abstraction.
//!
//! [`TxDevice`] is the single collaborator the pipeline talks to: one opened
//! transmit-capable front end, addressed by channel index. Implementations
//! live in [`crate::bladerf`] (hardware) and [`crate::sim`] (simulated).

use std::time::Duration;

use ntx_core::config::StreamSettings;
use ntx_core::types::{ChannelLayout, SampleFormat};

/// Result type for SDR operations.
pub type SdrResult<T> = Result<T, SdrError>;

/// Errors that can occur during SDR operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SdrError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("configuration rejected: {0}")]
    ConfigError(String),

    #[error("hardware error: {0}")]
    HardwareError(String),

    #[error("invalid channel index: {0}")]
    InvalidChannel(usize),

    #[error("timeout during {0}")]
    Timeout(String),

    #[error("unsupported operation: {0}")]
    NotSupported(String),

    #[error("device is closed")]
    Closed,
}

/// One opened transmit front end.
///
/// All tuning setters take effect immediately; getters return what the
/// hardware actually settled on, which may differ from the request when the
/// hardware coerces to a supported step. `transmit` is synchronous and
/// blocks for at most `timeout`.
///
/// Disabling a channel that was never enabled and closing an already-closed
/// device must both succeed; the shutdown path relies on it.
pub trait TxDevice: Send {
    /// Device name/description (board name, serial, …).
    fn name(&self) -> &str;

    fn set_frequency(&mut self, ch: usize, hz: u64) -> SdrResult<()>;
    fn frequency(&self, ch: usize) -> SdrResult<u64>;

    fn set_sample_rate(&mut self, ch: usize, hz: u32) -> SdrResult<()>;
    fn sample_rate(&self, ch: usize) -> SdrResult<u32>;

    fn set_bandwidth(&mut self, ch: usize, hz: u32) -> SdrResult<()>;
    fn bandwidth(&self, ch: usize) -> SdrResult<u32>;

    fn set_gain(&mut self, ch: usize, db: i32) -> SdrResult<()>;
    fn gain(&self, ch: usize) -> SdrResult<i32>;

    /// Names of the individually controllable gain stages on `ch`.
    fn gain_stages(&self, ch: usize) -> SdrResult<Vec<String>>;
    fn set_gain_stage(&mut self, ch: usize, stage: &str, db: i32) -> SdrResult<()>;

    /// Enable/disable the channel's bias-tee DC output.
    fn set_bias_tee(&mut self, ch: usize, enabled: bool) -> SdrResult<()>;

    /// Configure the synchronous stream interface for the given layout.
    fn configure_stream(
        &mut self,
        layout: ChannelLayout,
        format: SampleFormat,
        settings: &StreamSettings,
    ) -> SdrResult<()>;

    /// Enable or disable a transmit channel.
    fn enable_channel(&mut self, ch: usize, enabled: bool) -> SdrResult<()>;

    /// Transmit one transfer buffer (interleaved i16 I,Q across all enabled
    /// channels), blocking for at most `timeout`.
    fn transmit(&mut self, samples: &[i16], timeout: Duration) -> SdrResult<()>;

    /// Release the device. Idempotent.
    fn close(&mut self) -> SdrResult<()>;
}

/// Open a device from a `driver://args` URI.
///
/// Known drivers: `bladerf` (hardware via libbladeRF) and `sim` (simulated
/// device, useful for dry runs without hardware).
pub fn open_device(uri: &str) -> SdrResult<Box<dyn TxDevice>> {
    let (driver, args) = match uri.split_once("://") {
        Some((d, a)) => (d, a),
        None => (uri.trim_end_matches(':'), ""),
    };
    match driver {
        "bladerf" => Ok(Box::new(crate::bladerf::BladeRf::open(args)?)),
        "sim" => Ok(Box::new(crate::sim::SimDevice::new(2))),
        other => Err(SdrError::DeviceNotFound(format!("unknown driver: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_device_sim_uri() {
        let dev = open_device("sim://").unwrap();
        assert_eq!(dev.name(), "sim");
    }

    #[test]
    fn test_open_device_unknown_driver() {
        let err = match open_device("pluto://") {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, SdrError::DeviceNotFound(_)));
    }
}
