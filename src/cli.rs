//! Command-line interface
//!
//! Every flag overrides the matching field of the TOML configuration. Switch
//! flags can only turn a feature on; they never clear something the file
//! enabled.

use crate::config::Config;
use crate::error::Result;
use clap::Parser;
use std::path::PathBuf;

/// rtl_tcp compatible I/Q streaming server
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write cf32 samples to output file
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Driver name
    #[arg(long)]
    pub driver: Option<String>,

    /// Server host address
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Write cf32 samples to standard output
    #[arg(long)]
    pub stdout: bool,

    /// Center frequency (Hz)
    #[arg(long)]
    pub freq: Option<f64>,

    /// Sample rate (Hz)
    #[arg(long)]
    pub rate: Option<f64>,

    /// Gain (dB)
    #[arg(long, allow_negative_numbers = true)]
    pub gain: Option<f64>,

    /// Turn on automatic gain
    #[arg(long)]
    pub auto: bool,

    /// Number of blocks to skip sending over TCP
    #[arg(long)]
    pub skip: Option<u32>,

    /// Peak meter refresh interval (seconds)
    #[arg(long)]
    pub refresh: Option<f64>,

    /// Send 32-bit complex float samples to clients
    #[arg(long)]
    pub float: bool,

    /// Disable the rtl_tcp server
    #[arg(long)]
    pub noserver: bool,

    /// Disable the peak meter
    #[arg(long)]
    pub nometer: bool,

    /// Ignore tuning commands from clients
    #[arg(long)]
    pub freeze: bool,

    /// Assume a dumb terminal (no cursor control)
    #[arg(long)]
    pub dumb: bool,

    /// Append samples to the output file
    #[arg(long)]
    pub append: bool,

    /// Direct sampling: 1 or i = I branch, 2 or q = Q branch
    #[arg(long = "direct-samp")]
    pub direct_samp: Option<String>,

    /// Swap I and Q
    #[arg(long = "iq-swap")]
    pub iq_swap: bool,

    /// Enable bias tee
    #[arg(long)]
    pub biastee: bool,

    /// Enable digital AGC
    #[arg(long = "digital-agc")]
    pub digital_agc: bool,

    /// Enable offset tuning
    #[arg(long = "offset-tune")]
    pub offset_tune: bool,
}

impl Cli {
    /// Load the configuration file (if any) and layer the flags on top
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Override configuration fields with the flags given
    pub fn apply(&self, config: &mut Config) {
        let device = &mut config.device;
        if let Some(driver) = &self.driver {
            device.driver = driver.clone();
        }
        if self.freq.is_some() {
            device.frequency = self.freq;
        }
        if self.rate.is_some() {
            device.sample_rate = self.rate;
        }
        if self.gain.is_some() {
            device.gain = self.gain;
        }
        if let Some(mode) = &self.direct_samp {
            device.direct_sampling = Some(mode.clone());
        }
        device.auto_gain |= self.auto;
        device.iq_swap |= self.iq_swap;
        device.bias_tee |= self.biastee;
        device.digital_agc |= self.digital_agc;
        device.offset_tune |= self.offset_tune;

        let network = &mut config.network;
        if let Some(host) = &self.host {
            network.host = host.clone();
        }
        if let Some(port) = self.port {
            network.port = port;
        }
        if let Some(skip) = self.skip {
            network.skip = skip;
        }
        network.float_samples |= self.float;
        network.freeze |= self.freeze;
        if self.noserver {
            network.enabled = false;
        }

        if let Some(refresh) = self.refresh {
            config.meter.refresh_secs = refresh;
        }
        if self.nometer {
            config.meter.enabled = false;
        }
        config.meter.dumb_terminal |= self.dumb;

        if self.out.is_some() {
            config.output.path = self.out.clone();
        }
        config.output.append |= self.append;
        config.output.stdout |= self.stdout;
    }
}
