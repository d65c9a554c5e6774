//! # Simulated Transmit Device
//!
//! An in-memory [`TxDevice`] for tests and `sim://` dry runs. The device
//! records every call against shared state, so a cloned handle can inspect
//! what the pipeline did after the run:
//!
//! ```rust
//! use ntx_sdr::sim::SimDevice;
//! use ntx_sdr::device::TxDevice;
//! use ntx_core::config::StreamSettings;
//! use ntx_core::types::{ChannelLayout, SampleFormat};
//! use std::time::Duration;
//!
//! let probe = SimDevice::new(1);
//! let mut dev = probe.clone();
//! dev.set_frequency(0, 915_000_000).unwrap();
//! dev.configure_stream(ChannelLayout::Tx1, SampleFormat::Sc16Q11, &StreamSettings::default())
//!     .unwrap();
//! dev.transmit(&[0i16; 16], Duration::from_millis(100)).unwrap();
//! assert_eq!(probe.frequency_of(0), 915_000_000);
//! assert_eq!(probe.transmit_count(), 1);
//! ```
//!
//! Failure injection covers the cases the pipeline must survive: hardware
//! coercion of tuning requests, per-stage set failures, bias-tee failures,
//! transmit timeouts on a chosen call, and shutdown-path failures.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ntx_core::config::StreamSettings;
use ntx_core::types::{ChannelLayout, SampleFormat};

use crate::device::{SdrError, SdrResult, TxDevice};

/// Stream parameters the device was configured with.
#[derive(Debug, Clone)]
pub struct StreamDesc {
    pub layout: ChannelLayout,
    pub format: SampleFormat,
    pub buffer_size_samples: usize,
    pub num_buffers: u32,
    pub num_transfers: u32,
    pub timeout_ms: u32,
}

#[derive(Debug, Clone)]
struct SimChannel {
    frequency_hz: u64,
    sample_rate_hz: u32,
    bandwidth_hz: u32,
    gain_db: i32,
    stages: Vec<(String, i32)>,
    bias_tee: bool,
    enabled: bool,
}

impl SimChannel {
    fn new(stages: &[&str]) -> Self {
        Self {
            frequency_hz: 0,
            sample_rate_hz: 0,
            bandwidth_hz: 0,
            gain_db: 0,
            stages: stages.iter().map(|s| (s.to_string(), 0)).collect(),
            bias_tee: false,
            enabled: false,
        }
    }
}

struct SimState {
    channels: Vec<SimChannel>,
    /// Frequency requests are rounded down to a multiple of this step,
    /// emulating hardware coercion. 1 = exact.
    freq_step_hz: u64,
    stream: Option<StreamDesc>,
    /// Every transfer handed to `transmit`, including calls that then
    /// failed by injection.
    transfers: Vec<Vec<i16>>,
    closed: bool,
    fail_set_frequency: bool,
    fail_gain_stage_sets: bool,
    fail_bias_tee: bool,
    fail_disable: bool,
    fail_transmit_on: Option<u64>,
    transmit_hook: Option<Box<dyn FnMut(u64) + Send>>,
}

/// Simulated device handle. Clones share state; keep one clone outside the
/// pipeline to inspect recorded calls after a run.
#[derive(Clone)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    /// Device with `num_channels` transmit channels and the default gain
    /// stage set (`dsa1`).
    pub fn new(num_channels: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                channels: (0..num_channels).map(|_| SimChannel::new(&["dsa1"])).collect(),
                freq_step_hz: 1,
                stream: None,
                transfers: Vec::new(),
                closed: false,
                fail_set_frequency: false,
                fail_gain_stage_sets: false,
                fail_bias_tee: false,
                fail_disable: false,
                fail_transmit_on: None,
                transmit_hook: None,
            })),
        }
    }

    /// Replace every channel's gain stages with `stages` (all at value 0).
    pub fn with_gain_stages(self, stages: &[&str]) -> Self {
        {
            let mut st = self.lock();
            for ch in &mut st.channels {
                ch.stages = stages.iter().map(|s| (s.to_string(), 0)).collect();
            }
        }
        self
    }

    /// Round frequency requests down to a multiple of `step_hz`.
    pub fn with_frequency_step(self, step_hz: u64) -> Self {
        self.lock().freq_step_hz = step_hz.max(1);
        self
    }

    /// Make the `n`-th transmit call (1-based) fail with a timeout.
    pub fn fail_transmit_on(self, n: u64) -> Self {
        self.lock().fail_transmit_on = Some(n);
        self
    }

    /// Make every `set_frequency` call fail.
    pub fn fail_set_frequency(self) -> Self {
        self.lock().fail_set_frequency = true;
        self
    }

    /// Make every `set_gain_stage` call fail.
    pub fn fail_gain_stage_sets(self) -> Self {
        self.lock().fail_gain_stage_sets = true;
        self
    }

    /// Make every `set_bias_tee` call fail.
    pub fn fail_bias_tee(self) -> Self {
        self.lock().fail_bias_tee = true;
        self
    }

    /// Make channel-disable calls fail.
    pub fn fail_disable(self) -> Self {
        self.lock().fail_disable = true;
        self
    }

    /// Run `hook` on every transmit call with the 1-based call number,
    /// before any injected failure. The hook runs under the device lock and
    /// must not call back into the device.
    pub fn on_transmit(self, hook: impl FnMut(u64) + Send + 'static) -> Self {
        self.lock().transmit_hook = Some(Box::new(hook));
        self
    }

    // -- inspection ---------------------------------------------------------

    pub fn transmit_count(&self) -> usize {
        self.lock().transfers.len()
    }

    pub fn transfers(&self) -> Vec<Vec<i16>> {
        self.lock().transfers.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn channel_enabled(&self, ch: usize) -> bool {
        self.lock().channels[ch].enabled
    }

    pub fn frequency_of(&self, ch: usize) -> u64 {
        self.lock().channels[ch].frequency_hz
    }

    pub fn gain_of(&self, ch: usize) -> i32 {
        self.lock().channels[ch].gain_db
    }

    pub fn stage_value(&self, ch: usize, stage: &str) -> Option<i32> {
        self.lock().channels[ch]
            .stages
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, v)| *v)
    }

    pub fn bias_tee_of(&self, ch: usize) -> bool {
        self.lock().channels[ch].bias_tee
    }

    pub fn stream_desc(&self) -> Option<StreamDesc> {
        self.lock().stream.clone()
    }

    // -- internals ----------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("sim device state poisoned")
    }

    fn check_open(st: &SimState) -> SdrResult<()> {
        if st.closed {
            Err(SdrError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_channel(st: &SimState, ch: usize) -> SdrResult<()> {
        if ch < st.channels.len() {
            Ok(())
        } else {
            Err(SdrError::InvalidChannel(ch))
        }
    }
}

impl TxDevice for SimDevice {
    fn name(&self) -> &str {
        "sim"
    }

    fn set_frequency(&mut self, ch: usize, hz: u64) -> SdrResult<()> {
        let mut st = self.lock();
        Self::check_open(&st)?;
        Self::check_channel(&st, ch)?;
        if st.fail_set_frequency {
            return Err(SdrError::HardwareError("injected set_frequency failure".into()));
        }
        let step = st.freq_step_hz;
        st.channels[ch].frequency_hz = hz - hz % step;
        Ok(())
    }

    fn frequency(&self, ch: usize) -> SdrResult<u64> {
        let st = self.lock();
        Self::check_open(&st)?;
        Self::check_channel(&st, ch)?;
        Ok(st.channels[ch].frequency_hz)
    }

    fn set_sample_rate(&mut self, ch: usize, hz: u32) -> SdrResult<()> {
        let mut st = self.lock();
        Self::check_open(&st)?;
        Self::check_channel(&st, ch)?;
        st.channels[ch].sample_rate_hz = hz;
        Ok(())
    }

    fn sample_rate(&self, ch: usize) -> SdrResult<u32> {
        let st = self.lock();
        Self::check_open(&st)?;
        Self::check_channel(&st, ch)?;
        Ok(st.channels[ch].sample_rate_hz)
    }

    fn set_bandwidth(&mut self, ch: usize, hz: u32) -> SdrResult<()> {
        let mut st = self.lock();
        Self::check_open(&st)?;
        Self::check_channel(&st, ch)?;
        st.channels[ch].bandwidth_hz = hz;
        Ok(())
    }

    fn bandwidth(&self, ch: usize) -> SdrResult<u32> {
        let st = self.lock();
        Self::check_open(&st)?;
        Self::check_channel(&st, ch)?;
        Ok(st.channels[ch].bandwidth_hz)
    }

    fn set_gain(&mut self, ch: usize, db: i32) -> SdrResult<()> {
        let mut st = self.lock();
        Self::check_open(&st)?;
        Self::check_channel(&st, ch)?;
        st.channels[ch].gain_db = db;
        Ok(())
    }

    fn gain(&self, ch: usize) -> SdrResult<i32> {
        let st = self.lock();
        Self::check_open(&st)?;
        Self::check_channel(&st, ch)?;
        Ok(st.channels[ch].gain_db)
    }

    fn gain_stages(&self, ch: usize) -> SdrResult<Vec<String>> {
        let st = self.lock();
        Self::check_open(&st)?;
        Self::check_channel(&st, ch)?;
        Ok(st.channels[ch].stages.iter().map(|(name, _)| name.clone()).collect())
    }

    fn set_gain_stage(&mut self, ch: usize, stage: &str, db: i32) -> SdrResult<()> {
        let mut st = self.lock();
        Self::check_open(&st)?;
        Self::check_channel(&st, ch)?;
        if st.fail_gain_stage_sets {
            return Err(SdrError::HardwareError(format!("injected failure setting stage {}", stage)));
        }
        match st.channels[ch].stages.iter_mut().find(|(name, _)| name == stage) {
            Some((_, v)) => {
                *v = db;
                Ok(())
            }
            None => Err(SdrError::NotSupported(format!("no gain stage named {}", stage))),
        }
    }

    fn set_bias_tee(&mut self, ch: usize, enabled: bool) -> SdrResult<()> {
        let mut st = self.lock();
        Self::check_open(&st)?;
        Self::check_channel(&st, ch)?;
        if st.fail_bias_tee {
            return Err(SdrError::NotSupported("injected bias tee failure".into()));
        }
        st.channels[ch].bias_tee = enabled;
        Ok(())
    }

    fn configure_stream(
        &mut self,
        layout: ChannelLayout,
        format: SampleFormat,
        settings: &StreamSettings,
    ) -> SdrResult<()> {
        let mut st = self.lock();
        Self::check_open(&st)?;
        if layout.channel_count() > st.channels.len() {
            return Err(SdrError::ConfigError(format!(
                "layout needs {} channels, device has {}",
                layout.channel_count(),
                st.channels.len()
            )));
        }
        st.stream = Some(StreamDesc {
            layout,
            format,
            buffer_size_samples: settings.buffer_size_samples,
            num_buffers: settings.num_buffers,
            num_transfers: settings.num_transfers,
            timeout_ms: settings.timeout_ms,
        });
        Ok(())
    }

    fn enable_channel(&mut self, ch: usize, enabled: bool) -> SdrResult<()> {
        let mut st = self.lock();
        Self::check_channel(&st, ch)?;
        if enabled {
            Self::check_open(&st)?;
            st.channels[ch].enabled = true;
        } else {
            // Disable is idempotent and must work on a closed device.
            if st.fail_disable {
                return Err(SdrError::HardwareError("injected disable failure".into()));
            }
            st.channels[ch].enabled = false;
        }
        Ok(())
    }

    fn transmit(&mut self, samples: &[i16], _timeout: Duration) -> SdrResult<()> {
        let mut st = self.lock();
        Self::check_open(&st)?;
        if st.stream.is_none() {
            return Err(SdrError::ConfigError("stream not configured".into()));
        }
        st.transfers.push(samples.to_vec());
        let n = st.transfers.len() as u64;
        if let Some(hook) = st.transmit_hook.as_mut() {
            hook(n);
        }
        if st.fail_transmit_on == Some(n) {
            return Err(SdrError::Timeout(format!("transmit call {}", n)));
        }
        Ok(())
    }

    fn close(&mut self) -> SdrResult<()> {
        self.lock().closed = true;
        Ok(())
    }
}
