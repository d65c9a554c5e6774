//! # ntx SDR Layer
//!
//! Device abstraction and the transmit pipeline for the `ntx` wideband
//! test-noise transmitter.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │       TxPipeline (configure → stream →        │
//! │                shutdown)                      │
//! ├───────────────────────────────────────────────┤
//! │        TxDevice trait (one TX front end)      │
//! ├───────────────────────┬───────────────────────┤
//! │  BladeRf (libbladeRF, │  SimDevice (tests,    │
//! │  loaded at runtime)   │  dry runs)            │
//! └───────────────────────┴───────────────────────┘
//! ```
//!
//! The pipeline drives one or two transmit channels through a single
//! generalized path: per-channel configuration with an explicit read-back
//! policy, a bounded-timeout streaming loop fed by the noise source in
//! `ntx-core`, and a shutdown controller that always releases the hardware,
//! whatever state the run died in.

pub mod bladerf;
pub mod device;
pub mod pipeline;
pub mod sim;
pub mod tune;

pub use device::{open_device, SdrError, SdrResult, TxDevice};
pub use pipeline::{CancelToken, RunState, RunStats, TxPipeline};
pub use sim::SimDevice;
pub use tune::{configure_channel, ChannelReport};
