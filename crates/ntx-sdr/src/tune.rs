//! # Channel Configuration
//!
//! One-shot, sequential setup of a transmit channel: tune frequency, sample
//! rate, and bandwidth, apply the aggregate gain, then walk the channel's
//! gain stages and the bias tee.
//!
//! The hardware may coerce any tuning request to a supported step, so every
//! parameter is read back after it is applied. What happens with the
//! read-back value is governed by [`ReadbackPolicy`]: log-and-accept, or
//! fail configuration when the deviation exceeds a tolerance.
//!
//! Stage and bias-tee failures are non-fatal: they can reduce output power
//! but never prevent transmission. Everything else in this module is fatal
//! and aborts startup.

use std::collections::HashMap;

use ntx_core::config::{ChannelConfig, ReadbackPolicy};
use tracing::{info, warn};

use crate::device::{SdrError, SdrResult, TxDevice};

/// Substrings identifying attenuator-type stages: increasing value lowers
/// output power, so their maximum-power setting is 0.
const ATTENUATOR_MARKERS: &[&str] = &["dsa"];

/// Fixed near-maximum setting applied to amplifier-type stages.
pub const AMPLIFIER_STAGE_DB: i32 = 60;

/// Requested vs. hardware-applied values for one configured channel.
#[derive(Debug, Clone)]
pub struct ChannelReport {
    pub index: usize,
    pub requested_frequency_hz: u64,
    pub actual_frequency_hz: u64,
    pub requested_sample_rate_hz: u32,
    pub actual_sample_rate_hz: u32,
    pub requested_bandwidth_hz: u32,
    pub actual_bandwidth_hz: u32,
    pub requested_gain_db: i32,
    pub actual_gain_db: i32,
}

/// True when `name` identifies an attenuator-type stage.
pub fn is_attenuator_stage(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ATTENUATOR_MARKERS.iter().any(|m| lower.contains(m))
}

/// Stage setting under the maximum-output policy, unless overridden.
pub fn stage_target(name: &str, overrides: &HashMap<String, i32>) -> i32 {
    if let Some(&db) = overrides.get(name) {
        return db;
    }
    if is_attenuator_stage(name) {
        0
    } else {
        AMPLIFIER_STAGE_DB
    }
}

fn check_readback(
    what: &str,
    ch: usize,
    requested: f64,
    actual: f64,
    policy: &ReadbackPolicy,
) -> SdrResult<()> {
    let deviation_ppm = if requested == 0.0 {
        0.0
    } else {
        ((actual - requested) / requested).abs() * 1e6
    };
    match policy {
        ReadbackPolicy::LogOnly => {
            info!(channel = ch, requested, actual, "{} applied", what);
            Ok(())
        }
        ReadbackPolicy::Enforce { tolerance_ppm } => {
            if deviation_ppm > *tolerance_ppm {
                return Err(SdrError::ConfigError(format!(
                    "{} read-back out of tolerance on channel {}: requested {}, got {} ({:.0} ppm > {:.0} ppm)",
                    what, ch, requested, actual, deviation_ppm, tolerance_ppm
                )));
            }
            info!(channel = ch, requested, actual, deviation_ppm, "{} applied", what);
            Ok(())
        }
    }
}

/// Configure one transmit channel.
///
/// Fatal on frequency/rate/bandwidth/gain application failure (and on a
/// read-back tolerance violation under [`ReadbackPolicy::Enforce`]); stage
/// and bias-tee failures are logged and skipped.
pub fn configure_channel(
    dev: &mut dyn TxDevice,
    cfg: &ChannelConfig,
    readback: &ReadbackPolicy,
) -> SdrResult<ChannelReport> {
    let ch = cfg.index;

    dev.set_frequency(ch, cfg.frequency_hz)?;
    let actual_frequency_hz = dev.frequency(ch)?;
    check_readback(
        "frequency",
        ch,
        cfg.frequency_hz as f64,
        actual_frequency_hz as f64,
        readback,
    )?;

    dev.set_sample_rate(ch, cfg.sample_rate_hz)?;
    let actual_sample_rate_hz = dev.sample_rate(ch)?;
    check_readback(
        "sample rate",
        ch,
        f64::from(cfg.sample_rate_hz),
        f64::from(actual_sample_rate_hz),
        readback,
    )?;

    dev.set_bandwidth(ch, cfg.bandwidth_hz)?;
    let actual_bandwidth_hz = dev.bandwidth(ch)?;
    check_readback(
        "bandwidth",
        ch,
        f64::from(cfg.bandwidth_hz),
        f64::from(actual_bandwidth_hz),
        readback,
    )?;

    dev.set_gain(ch, cfg.gain_db)?;
    let actual_gain_db = dev.gain(ch)?;
    info!(channel = ch, requested = cfg.gain_db, actual = actual_gain_db, "gain applied");

    for stage in dev.gain_stages(ch)? {
        let db = stage_target(&stage, &cfg.gain_stage_overrides);
        match dev.set_gain_stage(ch, &stage, db) {
            Ok(()) => info!(channel = ch, stage = %stage, db, "gain stage set"),
            Err(e) => warn!(channel = ch, stage = %stage, db, error = %e, "gain stage not set"),
        }
    }

    if cfg.bias_tee {
        match dev.set_bias_tee(ch, true) {
            Ok(()) => info!(channel = ch, "bias tee enabled"),
            Err(e) => warn!(channel = ch, error = %e, "bias tee not enabled"),
        }
    }

    Ok(ChannelReport {
        index: ch,
        requested_frequency_hz: cfg.frequency_hz,
        actual_frequency_hz,
        requested_sample_rate_hz: cfg.sample_rate_hz,
        actual_sample_rate_hz,
        requested_bandwidth_hz: cfg.bandwidth_hz,
        actual_bandwidth_hz,
        requested_gain_db: cfg.gain_db,
        actual_gain_db,
    })
}
