//! rtl_tcp wire protocol
//!
//! # Handshake
//!
//! Sent once per connection, right after accept:
//!
//! ```text
//! ┌──────────────┬──────────────────┬──────────────────┐
//! │ Magic "RTL0" │ Tuner type       │ Tuner gain count │
//! │ 4 bytes      │ Big-endian u32   │ Big-endian u32   │
//! └──────────────┴──────────────────┴──────────────────┘
//! ```
//!
//! # Commands (client → server)
//!
//! ```text
//! ┌──────────────┬──────────────────┐
//! │ Opcode       │ Parameter        │
//! │ u8           │ Big-endian u32   │
//! └──────────────┴──────────────────┘
//! ```
//!
//! Frames are fixed size, so there is no resynchronisation: a frame is
//! decoded only once exactly [`COMMAND_SIZE`] bytes are buffered.
//!
//! # Samples (server → client)
//!
//! Unframed stream of interleaved I/Q, either native `f32` pairs or legacy
//! unsigned bytes centered at 128 (see [`WireFormat`]).

use crate::core::types::WireFormat;

/// Handshake magic tag
pub const HANDSHAKE_MAGIC: [u8; 4] = *b"RTL0";

/// Handshake payload size
pub const HANDSHAKE_SIZE: usize = 12;

/// Command frame size: opcode + u32 parameter
pub const COMMAND_SIZE: usize = 5;

/// Emulated tuner: Rafael Micro R820T
pub const TUNER_R820T: u32 = 5;

/// Number of discrete gain steps the R820T advertises
pub const R820T_GAIN_COUNT: u32 = 29;

pub const OP_SET_FREQUENCY: u8 = 0x01;
pub const OP_SET_SAMPLE_RATE: u8 = 0x02;
pub const OP_SET_GAIN_MODE: u8 = 0x03;
pub const OP_SET_GAIN: u8 = 0x04;

/// Tuner identification sent in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DongleInfo {
    pub tuner_type: u32,
    pub gain_count: u32,
}

impl Default for DongleInfo {
    fn default() -> Self {
        Self {
            tuner_type: TUNER_R820T,
            gain_count: R820T_GAIN_COUNT,
        }
    }
}

impl DongleInfo {
    pub fn encode(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut out = [0u8; HANDSHAKE_SIZE];
        out[..4].copy_from_slice(&HANDSHAKE_MAGIC);
        out[4..8].copy_from_slice(&self.tuner_type.to_be_bytes());
        out[8..].copy_from_slice(&self.gain_count.to_be_bytes());
        out
    }
}

/// Handshake payload for the emulated R820T dongle
pub fn encode_handshake() -> [u8; HANDSHAKE_SIZE] {
    DongleInfo::default().encode()
}

/// Raw command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub opcode: u8,
    pub param: u32,
}

impl Command {
    pub fn new(opcode: u8, param: u32) -> Self {
        Self { opcode, param }
    }

    /// Decode a complete frame; `None` unless exactly [`COMMAND_SIZE`] bytes
    pub fn try_decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != COMMAND_SIZE {
            return None;
        }
        Some(Self {
            opcode: buf[0],
            param: u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]),
        })
    }

    pub fn encode(&self) -> [u8; COMMAND_SIZE] {
        let p = self.param.to_be_bytes();
        [self.opcode, p[0], p[1], p[2], p[3]]
    }

    /// Protocol name of the opcode, for diagnostics
    pub fn name(&self) -> &'static str {
        opcode_name(self.opcode)
    }
}

/// Names of the rtl_tcp opcodes, including ones this server ignores
pub fn opcode_name(opcode: u8) -> &'static str {
    match opcode {
        0x01 => "set_center_freq",
        0x02 => "set_sample_rate",
        0x03 => "set_gain_mode",
        0x04 => "set_gain",
        0x05 => "set_freq_correction",
        0x06 => "set_if_gain",
        0x07 => "set_test_mode",
        0x08 => "set_agc_mode",
        0x09 => "set_direct_sampling",
        0x0a => "set_offset_tuning",
        0x0b => "set_rtl_xtal",
        0x0c => "set_tuner_xtal",
        0x0d => "set_tuner_gain_by_index",
        0x0e => "set_bias_tee",
        _ => "unknown",
    }
}

/// Convert one float sample to the legacy centered byte
///
/// `s * 128 + 128`, truncated toward zero and wrapped modulo 256. No
/// clamping: full-scale `1.0` becomes 256 and wraps to 0.
#[inline]
pub fn sample_to_u8(sample: f32) -> u8 {
    (sample * 128.0 + 128.0) as i32 as u8
}

/// Encode interleaved samples for the wire into `out` (cleared first)
pub fn encode_samples(samples: &[f32], format: WireFormat, out: &mut Vec<u8>) {
    out.clear();
    match format {
        WireFormat::Float32 => {
            out.reserve(samples.len() * 4);
            for s in samples {
                out.extend_from_slice(&s.to_ne_bytes());
            }
        }
        WireFormat::LegacyU8 => {
            out.extend(samples.iter().map(|&s| sample_to_u8(s)));
        }
    }
}
