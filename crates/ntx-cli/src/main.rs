//! ntx: stream wideband test noise to an SDR transmit front end.
//!
//! Thin front end over `ntx-sdr`: parses flags, merges them over the YAML
//! configuration, wires SIGINT into the pipeline's cancellation token, and
//! maps the run outcome onto the process exit code (0 for a clean stop,
//! nonzero for any device failure).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use ntx_core::config::{ChannelConfig, ReadbackPolicy, RefreshPolicy, TxConfig};
use ntx_core::observe::{init_logging, LogFormat};
use ntx_sdr::device::open_device;
use ntx_sdr::pipeline::{CancelToken, RunStats, TxPipeline};

#[derive(Parser, Debug)]
#[command(name = "ntx", version, about = "Stream wideband test noise to an SDR transmit front end")]
struct Args {
    /// Configuration file (YAML); defaults to $NTX_CONFIG, then ./ntx.yaml
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Device URI, e.g. "bladerf://" or "sim://"
    #[arg(short, long, value_name = "URI")]
    device: Option<String>,

    /// Center frequency in Hz; pass twice to drive two channels
    #[arg(short, long = "frequency", value_name = "HZ")]
    frequency: Vec<u64>,

    /// Sample rate in Hz, applied to every channel
    #[arg(long, value_name = "HZ")]
    sample_rate: Option<u32>,

    /// Bandwidth in Hz, applied to every channel
    #[arg(long, value_name = "HZ")]
    bandwidth: Option<u32>,

    /// TX gain in dB, applied to every channel
    #[arg(short, long, value_name = "DB")]
    gain: Option<i32>,

    /// Enable the bias-tee DC output on every channel
    #[arg(long)]
    bias_tee: bool,

    /// Samples per channel per transfer buffer
    #[arg(long, value_name = "N")]
    buffer_size: Option<usize>,

    /// Number of driver-side stream buffers
    #[arg(long, value_name = "N")]
    num_buffers: Option<u32>,

    /// Number of in-flight transfers
    #[arg(long, value_name = "N")]
    num_transfers: Option<u32>,

    /// Transmit timeout in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u32>,

    /// Keep cached noise buffers, refreshing each with 1% probability per
    /// iteration, instead of regenerating every iteration
    #[arg(long)]
    cached_noise: bool,

    /// Accept hardware read-back values without tolerance checking
    #[arg(long)]
    no_readback_check: bool,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

fn apply_overrides(config: &mut TxConfig, args: &Args) {
    if let Some(device) = &args.device {
        config.device = device.clone();
    }
    if !args.frequency.is_empty() {
        config.channels = args
            .frequency
            .iter()
            .enumerate()
            .map(|(index, &hz)| ChannelConfig::at(index, hz))
            .collect();
    }
    for ch in &mut config.channels {
        if let Some(hz) = args.sample_rate {
            ch.sample_rate_hz = hz;
        }
        if let Some(hz) = args.bandwidth {
            ch.bandwidth_hz = hz;
        }
        if let Some(db) = args.gain {
            ch.gain_db = db;
        }
        if args.bias_tee {
            ch.bias_tee = true;
        }
    }
    if let Some(n) = args.buffer_size {
        config.stream.buffer_size_samples = n;
    }
    if let Some(n) = args.num_buffers {
        config.stream.num_buffers = n;
    }
    if let Some(n) = args.num_transfers {
        config.stream.num_transfers = n;
    }
    if let Some(ms) = args.timeout_ms {
        config.stream.timeout_ms = ms;
    }
    if args.cached_noise {
        config.stream.refresh = RefreshPolicy::probabilistic();
    }
    if args.no_readback_check {
        config.stream.readback = ReadbackPolicy::LogOnly;
    }
}

fn run(args: &Args) -> anyhow::Result<RunStats> {
    let mut config = TxConfig::load(args.config.as_deref()).context("loading configuration")?;
    apply_overrides(&mut config, args);

    let mut log = config.log.clone();
    if let Some(level) = &args.log_level {
        log.level = level.parse().map_err(anyhow::Error::msg)?;
    }
    if args.json_logs {
        log.format = LogFormat::Json;
    }
    init_logging(&log);

    config.validate().context("validating configuration")?;

    let device = open_device(&config.device).context("opening device")?;
    let mut pipeline = TxPipeline::new(device, config)?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .context("installing interrupt handler")?;

    info!("transmitting; press Ctrl-C to stop");
    let stats = pipeline.run(&cancel)?;
    Ok(stats)
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(stats) => {
            info!(
                iterations = stats.iterations,
                samples = stats.samples_sent,
                "clean shutdown"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_flags_define_channels() {
        let args = Args::parse_from([
            "ntx",
            "--frequency",
            "1575420000",
            "--frequency",
            "1227600000",
            "--gain",
            "55",
        ]);
        let mut config = TxConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].frequency_hz, 1_575_420_000);
        assert_eq!(config.channels[1].frequency_hz, 1_227_600_000);
        assert_eq!(config.channels[1].index, 1);
        assert!(config.channels.iter().all(|c| c.gain_db == 55));
        config.validate().unwrap();
    }

    #[test]
    fn test_stream_overrides() {
        let args = Args::parse_from([
            "ntx",
            "--buffer-size",
            "4096",
            "--timeout-ms",
            "1000",
            "--cached-noise",
            "--no-readback-check",
        ]);
        let mut config = TxConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.stream.buffer_size_samples, 4096);
        assert_eq!(config.stream.timeout_ms, 1000);
        assert_eq!(config.stream.refresh, RefreshPolicy::probabilistic());
        assert_eq!(config.stream.readback, ReadbackPolicy::LogOnly);
    }

    #[test]
    fn test_defaults_leave_config_untouched() {
        let args = Args::parse_from(["ntx"]);
        let mut config = TxConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.stream.buffer_size_samples, 8192);
    }
}
