//! Configuration for TarangIO
//!
//! Loads configuration from a TOML file. Every field has a default, so an
//! empty file (or no file at all) yields a working mock setup listening on
//! `127.0.0.1:1234`. Command-line flags are layered on top by [`crate::cli`].

use crate::core::types::{DirectSampling, WireFormat};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub meter: MeterConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Tuner selection and startup tuning
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Driver name (default: "mock")
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Center frequency applied at startup (Hz)
    #[serde(default)]
    pub frequency: Option<f64>,

    /// Sample rate applied at startup (Hz)
    #[serde(default)]
    pub sample_rate: Option<f64>,

    /// Gain applied at startup (dB), forces manual gain mode
    #[serde(default)]
    pub gain: Option<f64>,

    /// Switch to automatic gain after the other settings
    #[serde(default)]
    pub auto_gain: bool,

    /// Direct sampling branch: "0", "1"/"i" or "2"/"q"
    #[serde(default)]
    pub direct_sampling: Option<String>,

    #[serde(default)]
    pub iq_swap: bool,

    #[serde(default)]
    pub bias_tee: bool,

    #[serde(default)]
    pub digital_agc: bool,

    #[serde(default)]
    pub offset_tune: bool,

    /// Complex samples per device read (default: 1024)
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Mock tuner parameters (only used when `driver = "mock"`)
    #[serde(default)]
    pub mock: MockConfig,
}

/// Simulated tuner signal
#[derive(Debug, Clone, Deserialize)]
pub struct MockConfig {
    /// Tone offset from the center frequency (Hz)
    #[serde(default = "default_tone_offset")]
    pub tone_offset_hz: f64,

    /// Tone amplitude at automatic gain, full scale = 1.0
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,

    /// Gaussian noise standard deviation per component
    #[serde(default = "default_noise_stddev")]
    pub noise_stddev: f32,

    /// Seed for the noise generator (0 = random each run)
    #[serde(default)]
    pub random_seed: u64,

    /// Pace reads at the sample rate like real hardware
    #[serde(default = "default_true")]
    pub realtime: bool,
}

/// TCP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Run the TCP server at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Listen host (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port (default: 1234)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Device reads to skip between network cycles
    #[serde(default)]
    pub skip: u32,

    /// Send 32-bit float samples instead of legacy unsigned bytes
    #[serde(default)]
    pub float_samples: bool,

    /// Ignore all tuning commands from clients
    #[serde(default)]
    pub freeze: bool,
}

/// Peak meter settings
#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Refresh interval (seconds of samples per report)
    #[serde(default = "default_refresh")]
    pub refresh_secs: f64,

    /// Plain line output for terminals without cursor control
    #[serde(default)]
    pub dumb_terminal: bool,
}

/// Raw sample output
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Write cf32 samples to this file
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Append to the file instead of truncating it
    #[serde(default)]
    pub append: bool,

    /// Write cf32 samples to standard output
    #[serde(default)]
    pub stdout: bool,
}

fn default_driver() -> String {
    "mock".to_string()
}

fn default_block_size() -> usize {
    1024
}

fn default_tone_offset() -> f64 {
    25_000.0
}

fn default_amplitude() -> f32 {
    0.5
}

fn default_noise_stddev() -> f32 {
    0.01
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1234
}

fn default_refresh() -> f64 {
    0.5
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            frequency: None,
            sample_rate: None,
            gain: None,
            auto_gain: false,
            direct_sampling: None,
            iq_swap: false,
            bias_tee: false,
            digital_agc: false,
            offset_tune: false,
            block_size: default_block_size(),
            mock: MockConfig::default(),
        }
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            tone_offset_hz: default_tone_offset(),
            amplitude: default_amplitude(),
            noise_stddev: default_noise_stddev(),
            random_seed: 0,
            realtime: true,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            skip: 0,
            float_samples: false,
            freeze: false,
        }
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_secs: default_refresh(),
            dumb_terminal: false,
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.block_size == 0 {
            return Err(Error::Config("device.block_size must be > 0".to_string()));
        }
        if let Some(rate) = self.device.sample_rate {
            if !(rate > 0.0 && rate.is_finite()) {
                return Err(Error::Config(format!(
                    "device.sample_rate must be a positive number of Hz, got {}",
                    rate
                )));
            }
        }
        if !(self.meter.refresh_secs > 0.0) {
            return Err(Error::Config(format!(
                "meter.refresh_secs must be > 0, got {}",
                self.meter.refresh_secs
            )));
        }
        self.direct_sampling()?;
        Ok(())
    }

    /// Parsed direct sampling mode
    pub fn direct_sampling(&self) -> Result<DirectSampling> {
        match &self.device.direct_sampling {
            Some(value) => value
                .parse()
                .map_err(|e: Error| Error::Config(e.to_string())),
            None => Ok(DirectSampling::Off),
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        WireFormat::from_float_flag(self.network.float_samples)
    }

    /// `host:port` listen address
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.host, self.network.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device.driver, "mock");
        assert_eq!(config.device.block_size, 1024);
        assert_eq!(config.listen_address(), "127.0.0.1:1234");
        assert_eq!(config.network.skip, 0);
        assert_eq!(config.meter.refresh_secs, 0.5);
        assert!(config.network.enabled);
        assert!(config.meter.enabled);
        assert_eq!(config.wire_format(), WireFormat::LegacyU8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.network.port, 1234);
        assert!(config.device.mock.realtime);
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[device]
driver = "mock"
frequency = 144.8e6
gain = 32.8
direct_sampling = "q"
bias_tee = true

[device.mock]
random_seed = 42
realtime = false

[network]
host = "0.0.0.0"
port = 7373
skip = 3
float_samples = true
freeze = true

[meter]
refresh_secs = 1.0
dumb_terminal = true

[output]
path = "capture.cf32"
append = true
"#;

        let config = Config::from_toml(toml_content).unwrap();
        assert_eq!(config.device.frequency, Some(144.8e6));
        assert_eq!(config.device.gain, Some(32.8));
        assert!(config.device.bias_tee);
        assert_eq!(config.direct_sampling().unwrap(), DirectSampling::QBranch);
        assert_eq!(config.device.mock.random_seed, 42);
        assert!(!config.device.mock.realtime);
        assert_eq!(config.listen_address(), "0.0.0.0:7373");
        assert_eq!(config.network.skip, 3);
        assert_eq!(config.wire_format(), WireFormat::Float32);
        assert!(config.network.freeze);
        assert!(config.meter.dumb_terminal);
        assert_eq!(config.output.path, Some(PathBuf::from("capture.cf32")));
        assert!(config.output.append);
    }

    #[test]
    fn test_validation_errors() {
        assert!(Config::from_toml("[device]\nblock_size = 0\n").is_err());
        assert!(Config::from_toml("[meter]\nrefresh_secs = 0.0\n").is_err());
        assert!(Config::from_toml("[device]\ndirect_sampling = \"x\"\n").is_err());
        assert!(Config::from_toml("[network]\nport = \"abc\"\n").is_err());
        assert!(Config::from_toml("[device]\nsample_rate = 0.0\n").is_err());
        assert!(Config::from_toml("[device]\nsample_rate = -2.048e6\n").is_err());
        assert!(Config::from_toml("[device]\nsample_rate = inf\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network]\nport = 4321").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.network.port, 4321);

        assert!(Config::load("/nonexistent/tarang.toml").is_err());
    }
}
