//! Radio trait definition

use crate::core::types::{GainMode, SampleBlock};
use crate::error::Result;

/// Tuner control and sample source
///
/// Everything the streaming server needs from a device, on a single RX
/// channel. All calls except [`read_block`](Radio::read_block) are expected
/// to return promptly. `read_block` is the only blocking call in the whole
/// server: it waits for the next block of samples.
///
/// Errors from any method are treated as fatal by the server loop.
pub trait Radio: Send {
    /// Current center frequency in Hz
    fn frequency(&self) -> Result<f64>;

    fn set_frequency(&mut self, hz: f64) -> Result<()>;

    /// Current sample rate in Hz
    fn sample_rate(&self) -> Result<f64>;

    fn set_sample_rate(&mut self, hz: f64) -> Result<()>;

    /// Current gain in dB
    fn gain(&self) -> Result<f64>;

    fn set_gain(&mut self, db: f64) -> Result<()>;

    fn set_gain_mode(&mut self, mode: GainMode) -> Result<()>;

    /// Write a driver-specific key/value setting (e.g. `biastee = true`)
    fn write_setting(&mut self, key: &str, value: &str) -> Result<()>;

    /// Start streaming, called once before the first read
    fn activate_stream(&mut self) -> Result<()>;

    /// Block until the next samples are available and write them into `block`
    ///
    /// Implementations call [`SampleBlock::set_filled`] with the number of
    /// complex samples delivered.
    fn read_block(&mut self, block: &mut SampleBlock) -> Result<()>;

    fn deactivate_stream(&mut self) -> Result<()>;

    fn close_stream(&mut self) -> Result<()>;
}

impl<R: Radio + ?Sized> Radio for Box<R> {
    fn frequency(&self) -> Result<f64> {
        (**self).frequency()
    }

    fn set_frequency(&mut self, hz: f64) -> Result<()> {
        (**self).set_frequency(hz)
    }

    fn sample_rate(&self) -> Result<f64> {
        (**self).sample_rate()
    }

    fn set_sample_rate(&mut self, hz: f64) -> Result<()> {
        (**self).set_sample_rate(hz)
    }

    fn gain(&self) -> Result<f64> {
        (**self).gain()
    }

    fn set_gain(&mut self, db: f64) -> Result<()> {
        (**self).set_gain(db)
    }

    fn set_gain_mode(&mut self, mode: GainMode) -> Result<()> {
        (**self).set_gain_mode(mode)
    }

    fn write_setting(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).write_setting(key, value)
    }

    fn activate_stream(&mut self) -> Result<()> {
        (**self).activate_stream()
    }

    fn read_block(&mut self, block: &mut SampleBlock) -> Result<()> {
        (**self).read_block(block)
    }

    fn deactivate_stream(&mut self) -> Result<()> {
        (**self).deactivate_stream()
    }

    fn close_stream(&mut self) -> Result<()> {
        (**self).close_stream()
    }
}
