//! # Transmit Pipeline
//!
//! The generalized N-channel transmit path: configure every channel once,
//! then run the steady-state loop
//!
//! ```text
//! generate ──► interleave ──► transmit (bounded by timeout) ──► yield
//! ```
//!
//! until the cancellation token is observed or a transfer fails, then tear
//! the device down. One control thread does everything; the only blocking
//! points are the synchronous transmit call and the per-iteration yield.
//!
//! Cancellation is delivered asynchronously (typically from a SIGINT
//! handler) but observed cooperatively, once per iteration, never preempting
//! an in-flight transfer. A stop can therefore lag by up to one transmit
//! timeout.
//!
//! The run moves through [`RunState`] strictly in order:
//! `Idle → Configuring → Streaming → Stopping → Closed`. Shutdown executes
//! on every exit path (clean cancellation, configuration failure, transfer
//! failure) and never raises, so `Closed` is always reached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use ntx_core::config::{ConfigError, RefreshPolicy, TxConfig};
use ntx_core::interleave::interleave_into;
use ntx_core::noise::NoiseSource;
use ntx_core::types::{ChannelLayout, SampleFormat};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::device::{SdrError, SdrResult, TxDevice};
use crate::tune::configure_channel;

/// Cooperative cancellation flag, shared between the streaming loop and
/// whatever delivers the stop request (signal handler, another thread).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Takes effect at the next loop iteration boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Device opened, pipeline constructed, nothing applied yet.
    Idle,
    /// Per-channel tuning and stream setup in progress.
    Configuring,
    /// Steady-state transmit loop.
    Streaming,
    /// Teardown in progress.
    Stopping,
    /// Device released. Terminal.
    Closed,
}

/// Counters for a finished run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Completed loop iterations (successful transfers).
    pub iterations: u64,
    /// Complex samples handed to the hardware, summed across channels.
    pub samples_sent: u64,
}

/// The transmit pipeline. Owns the device for the lifetime of the run.
pub struct TxPipeline {
    dev: Box<dyn TxDevice>,
    config: TxConfig,
    state: RunState,
    noise: NoiseSource,
    refresh_rng: SmallRng,
    stats: RunStats,
}

impl TxPipeline {
    /// Build a pipeline over an opened device. Validates the configuration.
    pub fn new(dev: Box<dyn TxDevice>, config: TxConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            dev,
            config,
            state: RunState::Idle,
            noise: NoiseSource::new(),
            refresh_rng: SmallRng::from_entropy(),
            stats: RunStats::default(),
        })
    }

    /// Replace the noise source (tests pin a seed this way).
    pub fn with_noise_source(mut self, noise: NoiseSource) -> Self {
        self.noise = noise;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Configure, stream until cancelled or failed, and tear down.
    ///
    /// Always leaves the pipeline in [`RunState::Closed`]; the returned
    /// error reflects the configure/stream phase, never shutdown. A second
    /// call fails without touching the device again.
    pub fn run(&mut self, cancel: &CancelToken) -> SdrResult<RunStats> {
        if self.state != RunState::Idle {
            return Err(SdrError::Closed);
        }
        let outcome = self.run_to_completion(cancel);
        self.shutdown();
        match outcome {
            Ok(()) => {
                info!(
                    iterations = self.stats.iterations,
                    samples = self.stats.samples_sent,
                    "transmission finished"
                );
                Ok(self.stats.clone())
            }
            Err(e) => Err(e),
        }
    }

    fn run_to_completion(&mut self, cancel: &CancelToken) -> SdrResult<()> {
        self.state = RunState::Configuring;
        info!(
            device = self.dev.name(),
            channels = self.config.channels.len(),
            "configuring device"
        );

        let readback = self.config.stream.readback;
        let channels = self.config.channels.clone();
        for ch in &channels {
            let report = configure_channel(self.dev.as_mut(), ch, &readback)?;
            info!(
                channel = report.index,
                freq_hz = report.actual_frequency_hz,
                rate_hz = report.actual_sample_rate_hz,
                bw_hz = report.actual_bandwidth_hz,
                gain_db = report.actual_gain_db,
                "channel configured"
            );
        }

        let layout = ChannelLayout::for_channel_count(channels.len()).ok_or_else(|| {
            SdrError::ConfigError(format!("unsupported channel count {}", channels.len()))
        })?;
        self.dev
            .configure_stream(layout, SampleFormat::Sc16Q11, &self.config.stream)?;
        for ch in &channels {
            self.dev.enable_channel(ch.index, true)?;
        }
        info!(?layout, "stream configured, channels enabled");

        self.state = RunState::Streaming;
        self.stream_loop(cancel)
    }

    fn stream_loop(&mut self, cancel: &CancelToken) -> SdrResult<()> {
        let num_channels = self.config.channels.len();
        let samples_per_buffer = self.config.stream.buffer_size_samples;
        let refresh = self.config.stream.refresh;
        let timeout = self.config.stream.timeout();
        let yield_interval = self.config.stream.yield_interval();

        let mut buffers: Vec<Vec<i16>> = vec![vec![0i16; 2 * samples_per_buffer]; num_channels];
        if matches!(refresh, RefreshPolicy::Probabilistic { .. }) {
            // Cached buffers must hold valid noise before the first transfer.
            for buf in &mut buffers {
                self.noise.fill(buf);
            }
        }
        let mut transfer: Vec<i16> = Vec::with_capacity(2 * num_channels * samples_per_buffer);

        info!(
            num_channels,
            samples_per_buffer,
            timeout_ms = self.config.stream.timeout_ms,
            "entering transmit loop"
        );
        loop {
            if cancel.is_cancelled() {
                info!("cancellation observed, leaving transmit loop");
                return Ok(());
            }

            match refresh {
                RefreshPolicy::EveryIteration => {
                    for buf in &mut buffers {
                        self.noise.fill(buf);
                    }
                }
                RefreshPolicy::Probabilistic { refresh_chance } => {
                    for buf in &mut buffers {
                        if self.refresh_rng.gen_bool(refresh_chance) {
                            self.noise.fill(buf);
                        }
                    }
                }
            }

            if num_channels == 1 {
                // Single channel: the per-channel buffer is the transfer.
                self.dev.transmit(&buffers[0], timeout)?;
            } else {
                let slices: Vec<&[i16]> = buffers.iter().map(Vec::as_slice).collect();
                interleave_into(&slices, &mut transfer);
                self.dev.transmit(&transfer, timeout)?;
            }
            self.stats.iterations += 1;
            self.stats.samples_sent += (num_channels * samples_per_buffer) as u64;

            thread::sleep(yield_interval);
        }
    }

    /// Best-effort teardown: disable every channel, release the device.
    /// Each step tolerates failure independently; nothing here raises.
    fn shutdown(&mut self) {
        self.state = RunState::Stopping;
        info!("shutting down");
        let indices: Vec<usize> = self.config.channels.iter().map(|c| c.index).collect();
        for ch in indices {
            if let Err(e) = self.dev.enable_channel(ch, false) {
                warn!(channel = ch, error = %e, "could not disable channel");
            }
        }
        if let Err(e) = self.dev.close() {
            warn!(error = %e, "could not release device");
        }
        self.state = RunState::Closed;
        info!("device released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimDevice;
    use ntx_core::config::{ChannelConfig, ReadbackPolicy, StreamSettings};
    use ntx_core::noise::MAX_SAMPLE;

    fn fast_stream(buffer_size_samples: usize) -> StreamSettings {
        StreamSettings {
            buffer_size_samples,
            yield_ms: 0,
            ..StreamSettings::default()
        }
    }

    fn dual_band_config(buffer_size_samples: usize) -> TxConfig {
        TxConfig {
            channels: vec![
                ChannelConfig::at(0, 1_575_420_000),
                ChannelConfig::at(1, 1_227_600_000),
            ],
            stream: fast_stream(buffer_size_samples),
            ..TxConfig::default()
        }
    }

    fn cancel_after(probe: SimDevice, n: u64) -> (SimDevice, CancelToken) {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let probe = probe.on_transmit(move |call| {
            if call == n {
                token.cancel();
            }
        });
        (probe, cancel)
    }

    #[test]
    fn test_dual_channel_end_to_end() {
        let (probe, cancel) = cancel_after(SimDevice::new(2), 3);
        let mut pipeline = TxPipeline::new(Box::new(probe.clone()), dual_band_config(8)).unwrap();

        let stats = pipeline.run(&cancel).unwrap();

        assert_eq!(stats.iterations, 3);
        assert_eq!(probe.transmit_count(), 3);
        for t in probe.transfers() {
            assert_eq!(t.len(), 32);
            assert!(t.iter().all(|v| v.abs() <= MAX_SAMPLE));
        }
        assert_eq!(probe.frequency_of(0), 1_575_420_000);
        assert_eq!(probe.frequency_of(1), 1_227_600_000);
        assert!(!probe.channel_enabled(0));
        assert!(!probe.channel_enabled(1));
        assert!(probe.is_closed());
        assert_eq!(pipeline.state(), RunState::Closed);
    }

    #[test]
    fn test_dual_channel_uses_tx2_layout() {
        let (probe, cancel) = cancel_after(SimDevice::new(2), 1);
        let mut pipeline = TxPipeline::new(Box::new(probe.clone()), dual_band_config(8)).unwrap();
        pipeline.run(&cancel).unwrap();
        assert_eq!(probe.stream_desc().unwrap().layout, ChannelLayout::Tx2);
    }

    #[test]
    fn test_single_channel_uses_tx1_layout() {
        let (probe, cancel) = cancel_after(SimDevice::new(1), 1);
        let config = TxConfig {
            channels: vec![ChannelConfig::at(0, 915_000_000)],
            stream: fast_stream(16),
            ..TxConfig::default()
        };
        let mut pipeline = TxPipeline::new(Box::new(probe.clone()), config).unwrap();
        pipeline.run(&cancel).unwrap();
        let desc = probe.stream_desc().unwrap();
        assert_eq!(desc.layout, ChannelLayout::Tx1);
        assert_eq!(probe.transfers()[0].len(), 32);
    }

    #[test]
    fn test_transmit_failure_stops_loop_and_still_shuts_down() {
        let probe = SimDevice::new(2).fail_transmit_on(2);
        let mut pipeline = TxPipeline::new(Box::new(probe.clone()), dual_band_config(8)).unwrap();

        let err = pipeline.run(&CancelToken::new()).unwrap_err();

        assert!(matches!(err, SdrError::Timeout(_)));
        assert_eq!(probe.transmit_count(), 2);
        assert!(!probe.channel_enabled(0));
        assert!(!probe.channel_enabled(1));
        assert!(probe.is_closed());
        assert_eq!(pipeline.state(), RunState::Closed);
    }

    #[test]
    fn test_configuration_failure_still_shuts_down() {
        let probe = SimDevice::new(1).fail_set_frequency();
        let config = TxConfig {
            channels: vec![ChannelConfig::at(0, 915_000_000)],
            stream: fast_stream(16),
            ..TxConfig::default()
        };
        let mut pipeline = TxPipeline::new(Box::new(probe.clone()), config).unwrap();

        let err = pipeline.run(&CancelToken::new()).unwrap_err();

        assert!(matches!(err, SdrError::HardwareError(_)));
        assert_eq!(probe.transmit_count(), 0);
        assert!(probe.is_closed());
        assert_eq!(pipeline.state(), RunState::Closed);
    }

    #[test]
    fn test_pre_cancelled_run_transmits_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let probe = SimDevice::new(1);
        let config = TxConfig {
            channels: vec![ChannelConfig::at(0, 915_000_000)],
            stream: fast_stream(16),
            ..TxConfig::default()
        };
        let mut pipeline = TxPipeline::new(Box::new(probe.clone()), config).unwrap();
        let stats = pipeline.run(&cancel).unwrap();
        assert_eq!(stats.iterations, 0);
        assert_eq!(probe.transmit_count(), 0);
        assert!(probe.is_closed());
    }

    #[test]
    fn test_cancellation_allows_at_most_one_more_transmit() {
        // Token set during the first transfer: the loop must observe it at
        // the next iteration boundary.
        let (probe, cancel) = cancel_after(SimDevice::new(2), 1);
        let mut pipeline = TxPipeline::new(Box::new(probe.clone()), dual_band_config(8)).unwrap();
        pipeline.run(&cancel).unwrap();
        assert_eq!(probe.transmit_count(), 1);
    }

    #[test]
    fn test_shutdown_survives_disable_failure() {
        let (probe, cancel) = cancel_after(SimDevice::new(2).fail_disable(), 1);
        let mut pipeline = TxPipeline::new(Box::new(probe.clone()), dual_band_config(8)).unwrap();
        // Disable failures are shutdown-path only; the run outcome stays clean.
        pipeline.run(&cancel).unwrap();
        assert!(probe.is_closed());
        assert_eq!(pipeline.state(), RunState::Closed);
    }

    #[test]
    fn test_probabilistic_zero_chance_reuses_buffer() {
        let (probe, cancel) = cancel_after(SimDevice::new(1), 4);
        let config = TxConfig {
            channels: vec![ChannelConfig::at(0, 915_000_000)],
            stream: StreamSettings {
                buffer_size_samples: 32,
                yield_ms: 0,
                refresh: RefreshPolicy::Probabilistic { refresh_chance: 0.0 },
                ..StreamSettings::default()
            },
            ..TxConfig::default()
        };
        let mut pipeline = TxPipeline::new(Box::new(probe.clone()), config).unwrap();
        pipeline.run(&cancel).unwrap();
        let transfers = probe.transfers();
        assert_eq!(transfers.len(), 4);
        assert!(transfers.iter().all(|t| *t == transfers[0]));
        assert!(transfers[0].iter().any(|&v| v != 0));
    }

    #[test]
    fn test_every_iteration_regenerates_buffer() {
        let (probe, cancel) = cancel_after(SimDevice::new(1), 3);
        let config = TxConfig {
            channels: vec![ChannelConfig::at(0, 915_000_000)],
            stream: StreamSettings {
                buffer_size_samples: 32,
                yield_ms: 0,
                refresh: RefreshPolicy::EveryIteration,
                ..StreamSettings::default()
            },
            ..TxConfig::default()
        };
        let mut pipeline = TxPipeline::new(Box::new(probe.clone()), config).unwrap();
        pipeline.run(&cancel).unwrap();
        let transfers = probe.transfers();
        assert_eq!(transfers.len(), 3);
        assert_ne!(transfers[0], transfers[1]);
        assert_ne!(transfers[1], transfers[2]);
    }

    #[test]
    fn test_readback_policy_flows_into_configuration() {
        let probe = SimDevice::new(1).with_frequency_step(1_000_000);
        let config = TxConfig {
            channels: vec![ChannelConfig::at(0, 1_575_420_000)],
            stream: StreamSettings {
                readback: ReadbackPolicy::Enforce { tolerance_ppm: 100.0 },
                ..fast_stream(16)
            },
            ..TxConfig::default()
        };
        let mut pipeline = TxPipeline::new(Box::new(probe.clone()), config).unwrap();
        let err = pipeline.run(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, SdrError::ConfigError(_)));
        assert!(probe.is_closed());
    }

    #[test]
    fn test_run_is_one_shot() {
        let (probe, cancel) = cancel_after(SimDevice::new(1), 1);
        let config = TxConfig {
            channels: vec![ChannelConfig::at(0, 915_000_000)],
            stream: fast_stream(16),
            ..TxConfig::default()
        };
        let mut pipeline = TxPipeline::new(Box::new(probe), config).unwrap();
        pipeline.run(&cancel).unwrap();
        assert!(matches!(pipeline.run(&cancel), Err(SdrError::Closed)));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = TxConfig::default();
        config.stream.buffer_size_samples = 0;
        assert!(TxPipeline::new(Box::new(SimDevice::new(1)), config).is_err());
    }

    #[test]
    fn test_samples_sent_accounting() {
        let (probe, cancel) = cancel_after(SimDevice::new(2), 3);
        let mut pipeline = TxPipeline::new(Box::new(probe), dual_band_config(8)).unwrap();
        let stats = pipeline.run(&cancel).unwrap();
        assert_eq!(stats.samples_sent, 3 * 2 * 8);
    }
}
