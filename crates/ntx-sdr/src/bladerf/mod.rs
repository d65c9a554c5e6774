//! # bladeRF Driver
//!
//! [`TxDevice`] implementation over libbladeRF's synchronous interface. The
//! vendor library is loaded at runtime (see [`ffi`]); if it is missing,
//! [`BladeRf::open`] fails with a clear error and nothing else in the crate
//! is affected.
//!
//! TX channels are addressed with the libbladeRF channel encoding
//! `(ch << 1) | 1`; dual-channel streaming uses the `TX_X2` interleaved
//! layout with SC16 Q11 samples, which matches the transfer buffers built by
//! `ntx_core::interleave`.

pub mod ffi;

use std::ffi::{c_uint, CStr, CString};
use std::ptr;
use std::time::Duration;

use ntx_core::config::StreamSettings;
use ntx_core::types::{ChannelLayout, SampleFormat};
use tracing::info;

use crate::device::{SdrError, SdrResult, TxDevice};

pub use ffi::is_available;

/// An opened bladeRF device.
pub struct BladeRf {
    handle: ffi::DeviceHandle,
    board: String,
    closed: bool,
}

// The raw handle is owned exclusively by this struct and every call goes
// through &mut self; moving the whole device between threads is fine.
unsafe impl Send for BladeRf {}

impl BladeRf {
    /// Open a device. `args` is a libbladeRF device identifier (e.g.
    /// `"*:serial=f12ce1"`); empty matches the first device found.
    pub fn open(args: &str) -> SdrResult<Self> {
        let lib = ffi::lib()?;
        let ident = CString::new(args)
            .map_err(|_| SdrError::ConfigError("device identifier contains NUL".into()))?;

        let mut handle: ffi::DeviceHandle = ptr::null_mut();
        ffi::check(unsafe { (lib.open)(&mut handle, ident.as_ptr()) }, "open")?;

        let board = unsafe {
            let name = (lib.get_board_name)(handle);
            if name.is_null() {
                "bladerf".to_string()
            } else {
                CStr::from_ptr(name).to_string_lossy().into_owned()
            }
        };
        info!(board = %board, "opened bladeRF device");

        Ok(Self {
            handle,
            board,
            closed: false,
        })
    }

    fn ensure_open(&self) -> SdrResult<()> {
        if self.closed {
            Err(SdrError::Closed)
        } else {
            Ok(())
        }
    }
}

impl TxDevice for BladeRf {
    fn name(&self) -> &str {
        &self.board
    }

    fn set_frequency(&mut self, ch: usize, hz: u64) -> SdrResult<()> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        ffi::check(
            unsafe { (lib.set_frequency)(self.handle, ffi::tx_channel(ch), hz) },
            "set_frequency",
        )
    }

    fn frequency(&self, ch: usize) -> SdrResult<u64> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        let mut hz: u64 = 0;
        ffi::check(
            unsafe { (lib.get_frequency)(self.handle, ffi::tx_channel(ch), &mut hz) },
            "get_frequency",
        )?;
        Ok(hz)
    }

    fn set_sample_rate(&mut self, ch: usize, hz: u32) -> SdrResult<()> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        let mut actual: c_uint = 0;
        ffi::check(
            unsafe { (lib.set_sample_rate)(self.handle, ffi::tx_channel(ch), hz, &mut actual) },
            "set_sample_rate",
        )
    }

    fn sample_rate(&self, ch: usize) -> SdrResult<u32> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        let mut hz: c_uint = 0;
        ffi::check(
            unsafe { (lib.get_sample_rate)(self.handle, ffi::tx_channel(ch), &mut hz) },
            "get_sample_rate",
        )?;
        Ok(hz)
    }

    fn set_bandwidth(&mut self, ch: usize, hz: u32) -> SdrResult<()> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        let mut actual: c_uint = 0;
        ffi::check(
            unsafe { (lib.set_bandwidth)(self.handle, ffi::tx_channel(ch), hz, &mut actual) },
            "set_bandwidth",
        )
    }

    fn bandwidth(&self, ch: usize) -> SdrResult<u32> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        let mut hz: c_uint = 0;
        ffi::check(
            unsafe { (lib.get_bandwidth)(self.handle, ffi::tx_channel(ch), &mut hz) },
            "get_bandwidth",
        )?;
        Ok(hz)
    }

    fn set_gain(&mut self, ch: usize, db: i32) -> SdrResult<()> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        ffi::check(
            unsafe { (lib.set_gain)(self.handle, ffi::tx_channel(ch), db) },
            "set_gain",
        )
    }

    fn gain(&self, ch: usize) -> SdrResult<i32> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        let mut db = 0;
        ffi::check(
            unsafe { (lib.get_gain)(self.handle, ffi::tx_channel(ch), &mut db) },
            "get_gain",
        )?;
        Ok(db)
    }

    fn gain_stages(&self, ch: usize) -> SdrResult<Vec<String>> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        let channel = ffi::tx_channel(ch);

        // First call with no buffer returns the stage count.
        let count = unsafe { (lib.get_gain_stages)(self.handle, channel, ptr::null_mut(), 0) };
        ffi::check(count, "get_gain_stages")?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut ptrs = vec![ptr::null(); count as usize];
        let filled = unsafe {
            (lib.get_gain_stages)(self.handle, channel, ptrs.as_mut_ptr(), ptrs.len())
        };
        ffi::check(filled, "get_gain_stages")?;

        // Stage names are static strings owned by the library.
        Ok(ptrs
            .into_iter()
            .take(filled as usize)
            .filter(|p| !p.is_null())
            .map(|p| unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
            .collect())
    }

    fn set_gain_stage(&mut self, ch: usize, stage: &str, db: i32) -> SdrResult<()> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        let name = CString::new(stage)
            .map_err(|_| SdrError::ConfigError("stage name contains NUL".into()))?;
        ffi::check(
            unsafe { (lib.set_gain_stage)(self.handle, ffi::tx_channel(ch), name.as_ptr(), db) },
            "set_gain_stage",
        )
    }

    fn set_bias_tee(&mut self, ch: usize, enabled: bool) -> SdrResult<()> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        ffi::check(
            unsafe { (lib.set_bias_tee)(self.handle, ffi::tx_channel(ch), enabled) },
            "set_bias_tee",
        )
    }

    fn configure_stream(
        &mut self,
        layout: ChannelLayout,
        format: SampleFormat,
        settings: &StreamSettings,
    ) -> SdrResult<()> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        let layout_c = match layout {
            ChannelLayout::Tx1 => ffi::BLADERF_TX_X1,
            ChannelLayout::Tx2 => ffi::BLADERF_TX_X2,
        };
        let format_c = match format {
            SampleFormat::Sc16Q11 => ffi::BLADERF_FORMAT_SC16_Q11,
        };
        ffi::check(
            unsafe {
                (lib.sync_config)(
                    self.handle,
                    layout_c,
                    format_c,
                    settings.num_buffers,
                    settings.buffer_size_samples as c_uint,
                    settings.num_transfers,
                    settings.timeout_ms,
                )
            },
            "sync_config",
        )
    }

    fn enable_channel(&mut self, ch: usize, enabled: bool) -> SdrResult<()> {
        if self.closed && !enabled {
            // Shutdown path: disabling after close is a no-op.
            return Ok(());
        }
        self.ensure_open()?;
        let lib = ffi::lib()?;
        ffi::check(
            unsafe { (lib.enable_module)(self.handle, ffi::tx_channel(ch), enabled) },
            "enable_module",
        )
    }

    fn transmit(&mut self, samples: &[i16], timeout: Duration) -> SdrResult<()> {
        self.ensure_open()?;
        let lib = ffi::lib()?;
        // sync_tx counts IQ pairs; for interleaved layouts that is the total
        // across all channels, i.e. half the i16 count.
        let num_samples = (samples.len() / 2) as c_uint;
        let timeout_ms = timeout.as_millis().min(u128::from(c_uint::MAX)) as c_uint;
        ffi::check(
            unsafe {
                (lib.sync_tx)(
                    self.handle,
                    samples.as_ptr().cast(),
                    num_samples,
                    ptr::null_mut(),
                    timeout_ms,
                )
            },
            "sync_tx",
        )
    }

    fn close(&mut self) -> SdrResult<()> {
        if self.closed {
            return Ok(());
        }
        if let Ok(lib) = ffi::lib() {
            unsafe { (lib.close)(self.handle) };
        }
        self.closed = true;
        info!(board = %self.board, "closed bladeRF device");
        Ok(())
    }
}

impl Drop for BladeRf {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
