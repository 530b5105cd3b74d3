//! Command dispatcher
//!
//! Translates complete rtl_tcp command frames into [`Radio`] calls and keeps
//! [`Settings`] in step with what was applied.
//!
//! | Opcode | Name | Effect |
//! |--------|------|--------|
//! | `0x01` | set_center_freq | frequency in Hz; remapped to `|p - 100 MHz|` when direct sampling |
//! | `0x02` | set_sample_rate | sample rate in Hz |
//! | `0x03` | set_gain_mode | non-zero = manual, zero = automatic |
//! | `0x04` | set_gain | tenths of a dB; also forces manual gain mode |
//! | other | - | logged as unimplemented, no device call |
//!
//! When settings are frozen no opcode reaches the device.

use crate::core::driver::Radio;
use crate::core::types::{GainMode, Settings};
use crate::error::Result;
use crate::streaming::protocol::{
    Command, OP_SET_FREQUENCY, OP_SET_GAIN, OP_SET_GAIN_MODE, OP_SET_SAMPLE_RATE,
};

/// Direct sampling frequencies are offsets from this reference (Hz)
pub const DIRECT_SAMPLING_REFERENCE_HZ: f64 = 100e6;

/// What a dispatched command did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch {
    Frequency(f64),
    SampleRate(f64),
    GainMode(GainMode),
    Gain(f64),
    /// Settings are frozen, nothing applied
    Frozen,
    /// Opcode has no effect in this server
    Unimplemented,
}

impl Dispatch {
    /// Whether the device was touched
    pub fn applied(&self) -> bool {
        !matches!(self, Dispatch::Frozen | Dispatch::Unimplemented)
    }
}

/// Map a client frequency to the tuned frequency for direct sampling
#[inline]
pub fn direct_sampling_frequency(param: u32) -> f64 {
    (f64::from(param) - DIRECT_SAMPLING_REFERENCE_HZ).abs()
}

/// Owns the mutable server-wide settings and applies client commands
pub struct CommandDispatcher {
    settings: Settings,
}

impl CommandDispatcher {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Apply one command to the radio
    ///
    /// Never fails for protocol reasons; only a radio error is returned and
    /// that is fatal to the caller.
    pub fn dispatch(&mut self, radio: &mut dyn Radio, command: Command) -> Result<Dispatch> {
        let Command { opcode, param } = command;

        if self.settings.frozen {
            log::warn!(
                "Frozen settings, ignoring command 0x{:02x} {}: {}",
                opcode,
                command.name(),
                param
            );
            return Ok(Dispatch::Frozen);
        }

        let outcome = match opcode {
            OP_SET_FREQUENCY => {
                let hz = if self.settings.direct_sampling.is_active() {
                    direct_sampling_frequency(param)
                } else {
                    f64::from(param)
                };
                log::info!("0x{:02x} set_center_freq: {} Hz", opcode, hz);
                radio.set_frequency(hz)?;
                self.settings.frequency_hz = hz;
                Dispatch::Frequency(hz)
            }
            OP_SET_SAMPLE_RATE => {
                let hz = f64::from(param);
                log::info!("0x{:02x} set_sample_rate: {} Hz", opcode, hz);
                radio.set_sample_rate(hz)?;
                // The tuner may refuse a rate; the meter needs the real one
                self.settings.sample_rate_hz = radio.sample_rate()?;
                Dispatch::SampleRate(hz)
            }
            OP_SET_GAIN_MODE => {
                let mode = if param != 0 {
                    GainMode::Manual
                } else {
                    GainMode::Automatic
                };
                log::info!("0x{:02x} set_gain_mode: {} ({})", opcode, param, mode);
                radio.set_gain_mode(mode)?;
                self.settings.gain_mode = Some(mode);
                Dispatch::GainMode(mode)
            }
            OP_SET_GAIN => {
                let db = f64::from(param) / 10.0;
                log::info!("0x{:02x} set_gain: {} dB", opcode, db);
                radio.set_gain_mode(GainMode::Manual)?;
                radio.set_gain(db)?;
                self.settings.gain_mode = Some(GainMode::Manual);
                self.settings.gain_db = db;
                Dispatch::Gain(db)
            }
            _ => {
                log::warn!(
                    "0x{:02x} {} unimplemented: {}",
                    opcode,
                    command.name(),
                    param
                );
                Dispatch::Unimplemented
            }
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::driver::testing::{RadioCall, RecordingRadio};
    use crate::core::types::DirectSampling;

    fn dispatcher(frozen: bool, direct_sampling: DirectSampling) -> CommandDispatcher {
        CommandDispatcher::new(Settings {
            frozen,
            direct_sampling,
            ..Settings::default()
        })
    }

    #[test]
    fn test_set_frequency() {
        let mut radio = RecordingRadio::new();
        let mut d = dispatcher(false, DirectSampling::Off);

        let out = d.dispatch(&mut radio, Command::new(0x01, 433_920_000)).unwrap();
        assert_eq!(out, Dispatch::Frequency(433_920_000.0));
        assert_eq!(radio.calls, vec![RadioCall::SetFrequency(433_920_000.0)]);
        assert_eq!(d.settings().frequency_hz, 433_920_000.0);
    }

    #[test]
    fn test_direct_sampling_frequency_offset() {
        let mut radio = RecordingRadio::new();
        let mut d = dispatcher(false, DirectSampling::QBranch);

        d.dispatch(&mut radio, Command::new(0x01, 107_000_000)).unwrap();
        d.dispatch(&mut radio, Command::new(0x01, 93_500_000)).unwrap();
        d.dispatch(&mut radio, Command::new(0x01, 0)).unwrap();
        assert_eq!(
            radio.calls,
            vec![
                RadioCall::SetFrequency(7_000_000.0),
                RadioCall::SetFrequency(6_500_000.0),
                RadioCall::SetFrequency(100_000_000.0),
            ]
        );
        assert_eq!(direct_sampling_frequency(u32::MAX), 4_194_967_295.0);
    }

    #[test]
    fn test_set_sample_rate() {
        let mut radio = RecordingRadio::new();
        let mut d = dispatcher(false, DirectSampling::Off);

        d.dispatch(&mut radio, Command::new(0x02, 2_400_000)).unwrap();
        assert_eq!(radio.calls, vec![RadioCall::SetSampleRate(2_400_000.0)]);
        assert_eq!(d.settings().sample_rate_hz, 2_400_000.0);
    }

    #[test]
    fn test_gain_mode_flag_one_means_manual() {
        let mut radio = RecordingRadio::new();
        let mut d = dispatcher(false, DirectSampling::Off);

        d.dispatch(&mut radio, Command::new(0x03, 1)).unwrap();
        d.dispatch(&mut radio, Command::new(0x03, 0)).unwrap();
        d.dispatch(&mut radio, Command::new(0x03, 7)).unwrap();
        assert_eq!(
            radio.calls,
            vec![
                RadioCall::SetGainMode(GainMode::Manual),
                RadioCall::SetGainMode(GainMode::Automatic),
                RadioCall::SetGainMode(GainMode::Manual),
            ]
        );
    }

    #[test]
    fn test_set_gain_tenths_forces_manual() {
        let mut radio = RecordingRadio::new();
        let mut d = dispatcher(false, DirectSampling::Off);

        let out = d.dispatch(&mut radio, Command::new(0x04, 496)).unwrap();
        assert_eq!(out, Dispatch::Gain(49.6));
        assert_eq!(
            radio.calls,
            vec![
                RadioCall::SetGainMode(GainMode::Manual),
                RadioCall::SetGain(496.0 / 10.0),
            ]
        );
        assert_eq!(d.settings().gain_mode, Some(GainMode::Manual));
        assert_eq!(d.settings().gain_db, 49.6);
    }

    #[test]
    fn test_unimplemented_opcode_has_no_effect() {
        let mut radio = RecordingRadio::new();
        let mut d = dispatcher(false, DirectSampling::Off);

        for opcode in [0x00, 0x05, 0x08, 0x0e, 0xff] {
            let out = d.dispatch(&mut radio, Command::new(opcode, 1)).unwrap();
            assert_eq!(out, Dispatch::Unimplemented);
            assert!(!out.applied());
        }
        assert!(radio.calls.is_empty());
        assert_eq!(d.settings(), &Settings::default());
    }

    #[test]
    fn test_frozen_makes_no_device_calls() {
        let mut radio = RecordingRadio::new();
        let mut d = dispatcher(true, DirectSampling::IBranch);

        for opcode in 0u8..=0x10 {
            let out = d
                .dispatch(&mut radio, Command::new(opcode, 1_000_000))
                .unwrap();
            assert_eq!(out, Dispatch::Frozen);
        }
        assert!(radio.calls.is_empty());
        assert_eq!(d.settings().frequency_hz, Settings::default().frequency_hz);
    }
}
