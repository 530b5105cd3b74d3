//! Core data types shared by the tuner interface and the streaming server.
//!
//! Key types:
//! - [`SampleBlock`]: One device read worth of interleaved I/Q samples
//! - [`Settings`]: Server-wide tuning state, mutated only by the dispatcher
//! - [`WireFormat`]: How sample blocks are put on the wire

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Interleaved complex float samples (`I0, Q0, I1, Q1, ...`) from one device read
///
/// The backing buffer is allocated once for the configured block size and
/// reused for every read. A driver may deliver fewer samples than requested,
/// in which case only the filled prefix is visible through [`samples`](Self::samples).
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    data: Vec<f32>,
    filled: usize,
}

impl SampleBlock {
    /// Create a zeroed block holding `complex_len` I/Q pairs
    pub fn new(complex_len: usize) -> Self {
        Self {
            data: vec![0.0; complex_len * 2],
            filled: complex_len,
        }
    }

    /// Capacity in complex samples
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len() / 2
    }

    /// Number of complex samples delivered by the last read
    #[inline]
    pub fn complex_len(&self) -> usize {
        self.filled
    }

    /// Filled interleaved samples
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.data[..self.filled * 2]
    }

    /// Whole backing buffer, for drivers to fill
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Mark how many complex samples the driver wrote
    #[inline]
    pub fn set_filled(&mut self, complex_len: usize) {
        self.filled = complex_len.min(self.capacity());
    }
}

/// Tuner gain control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    /// Tuner AGC picks the gain
    Automatic,
    /// Gain is set explicitly
    Manual,
}

impl fmt::Display for GainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GainMode::Automatic => write!(f, "automatic"),
            GainMode::Manual => write!(f, "manual"),
        }
    }
}

/// Direct sampling branch (HF reception bypassing the tuner)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectSampling {
    #[default]
    Off,
    /// I branch (`1` or `i`)
    IBranch,
    /// Q branch (`2` or `q`)
    QBranch,
}

impl DirectSampling {
    /// Whether center frequencies are remapped to an offset
    #[inline]
    pub fn is_active(self) -> bool {
        self != DirectSampling::Off
    }

    /// Value written to the driver's `direct_samp` setting
    pub fn setting_value(self) -> &'static str {
        match self {
            DirectSampling::Off => "0",
            DirectSampling::IBranch => "1",
            DirectSampling::QBranch => "2",
        }
    }
}

impl FromStr for DirectSampling {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "0" => Ok(DirectSampling::Off),
            "1" | "i" => Ok(DirectSampling::IBranch),
            "2" | "q" => Ok(DirectSampling::QBranch),
            other => Err(Error::InvalidParameter(format!(
                "direct sampling must be 0, 1/i or 2/q, got '{}'",
                other
            ))),
        }
    }
}

/// Supported sample wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Native 32-bit float pairs, passed through unchanged
    Float32,
    /// Legacy unsigned 8-bit samples centered at 128
    #[default]
    LegacyU8,
}

impl WireFormat {
    pub fn from_float_flag(float_samples: bool) -> Self {
        if float_samples {
            WireFormat::Float32
        } else {
            WireFormat::LegacyU8
        }
    }
}

/// Server-wide settings
///
/// Populated once at startup from configuration and the tuner's reported
/// state. Afterwards only the command dispatcher mutates the tunable fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Center frequency in Hz
    pub frequency_hz: f64,
    /// Sample rate in Hz
    pub sample_rate_hz: f64,
    /// Gain in dB
    pub gain_db: f64,
    /// Last gain mode applied, `None` until something sets it
    pub gain_mode: Option<GainMode>,
    /// Ignore every client command
    pub frozen: bool,
    pub direct_sampling: DirectSampling,
    pub wire_format: WireFormat,
    /// Device reads skipped between network cycles (0 = every read)
    pub skip: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frequency_hz: 100e6,
            sample_rate_hz: 2.048e6,
            gain_db: 0.0,
            gain_mode: None,
            frozen: false,
            direct_sampling: DirectSampling::Off,
            wire_format: WireFormat::LegacyU8,
            skip: 0,
        }
    }
}
