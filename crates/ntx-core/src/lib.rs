//! # ntx Core Library
//!
//! Hardware-independent core of the `ntx` wideband test-noise transmitter:
//! noise sample generation, multi-channel transfer-buffer interleaving, the
//! configuration model, and structured logging setup.
//!
//! The transmit path itself (device abstraction, channel configuration, the
//! streaming loop) lives in the `ntx-sdr` crate; the thin command-line front
//! end lives in `ntx-cli`.
//!
//! ## Signal Flow
//!
//! ```text
//! NoiseSource ──► SampleBuffer (per channel, interleaved I,Q as i16)
//!                      │
//!                      ▼
//!             interleave_channels ──► TransferBuffer (slot-major,
//!                                     channel-minor, I-before-Q)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ntx_core::noise::NoiseSource;
//! use ntx_core::interleave::interleave_channels;
//!
//! let mut src = NoiseSource::with_seed(7);
//! let ch0 = src.generate(4);
//! let ch1 = src.generate(4);
//! let transfer = interleave_channels(&[&ch0, &ch1]);
//! assert_eq!(transfer.len(), 16);
//! ```

pub mod config;
pub mod interleave;
pub mod noise;
pub mod observe;
pub mod types;

pub use config::{ChannelConfig, ConfigError, ReadbackPolicy, RefreshPolicy, StreamSettings, TxConfig};
pub use noise::NoiseSource;
pub use types::{ChannelLayout, Sample, SampleBuffer, SampleFormat};
