//! Mock tuner for hardware-free operation
//!
//! Produces a complex tone at a fixed offset from the tuned center frequency
//! plus Gaussian noise, so clients see a carrier in their waterfall and the
//! peak meter has something to report.
//!
//! # Configuration
//!
//! ```toml
//! [device]
//! driver = "mock"
//!
//! [device.mock]
//! tone_offset_hz = 25000.0
//! amplitude = 0.5        # at automatic gain
//! noise_stddev = 0.01
//! random_seed = 42       # 0 = random each run
//! realtime = true        # pace reads at the sample rate
//! ```
//!
//! # Gain
//!
//! In manual mode the tone is scaled by `10^((gain - 30 dB) / 20)` and each
//! component clipped to ±1.0 like a saturating ADC. Automatic mode uses the
//! configured amplitude as-is.

pub mod noise;

use crate::config::MockConfig;
use crate::core::driver::Radio;
use crate::core::types::{GainMode, SampleBlock};
use crate::error::{Error, Result};
use noise::NoiseGenerator;
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

/// Manual gain at which the tone has the configured amplitude
const REFERENCE_GAIN_DB: f64 = 30.0;

/// Slowest rate the mock accepts; anything lower is ignored
const MIN_SAMPLE_RATE_HZ: f64 = 1.0;

/// R820T tuning range
const MIN_FREQUENCY_HZ: f64 = 24e6;
const MAX_FREQUENCY_HZ: f64 = 1_766e6;

/// Simulated R820T dongle
pub struct MockRadio {
    config: MockConfig,
    frequency: f64,
    sample_rate: f64,
    gain: f64,
    gain_mode: GainMode,
    settings: HashMap<String, String>,
    noise: NoiseGenerator,
    phase: f64,
    active: bool,
    next_deadline: Option<Instant>,
    blocks_read: u64,
}

impl MockRadio {
    pub fn new(config: MockConfig) -> Self {
        let noise = NoiseGenerator::new(config.random_seed);
        Self {
            config,
            frequency: 100e6,
            sample_rate: 2.048e6,
            gain: 0.0,
            gain_mode: GainMode::Automatic,
            settings: HashMap::new(),
            noise,
            phase: 0.0,
            active: false,
            next_deadline: None,
            blocks_read: 0,
        }
    }

    pub fn gain_mode(&self) -> GainMode {
        self.gain_mode
    }

    /// Vendor settings written so far
    pub fn settings(&self) -> &HashMap<String, String> {
        &self.settings
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    fn tone_amplitude(&self) -> f32 {
        match self.gain_mode {
            GainMode::Automatic => self.config.amplitude,
            GainMode::Manual => {
                let scale = 10f64.powf((self.gain - REFERENCE_GAIN_DB) / 20.0);
                (f64::from(self.config.amplitude) * scale) as f32
            }
        }
    }

    /// Sleep until this block would have arrived from real hardware
    fn pace(&mut self, complex_len: usize) -> Result<()> {
        let block_time = Duration::try_from_secs_f64(complex_len as f64 / self.sample_rate)
            .map_err(|e| {
                Error::Device(format!(
                    "cannot pace {} samples at {} Hz: {}",
                    complex_len, self.sample_rate, e
                ))
            })?;
        let now = Instant::now();
        let next = self.next_deadline.and_then(|d| d.checked_add(block_time));
        let deadline = match next {
            Some(next) if now <= next => next,
            // Fell more than a block behind: resynchronise instead of bursting
            _ => now.checked_add(block_time).ok_or_else(|| {
                Error::Device(format!("block deadline overflow at {} Hz", self.sample_rate))
            })?,
        };
        if deadline > now {
            thread::sleep(deadline - now);
        }
        self.next_deadline = Some(deadline);
        Ok(())
    }
}

impl Radio for MockRadio {
    fn frequency(&self) -> Result<f64> {
        Ok(self.frequency)
    }

    fn set_frequency(&mut self, hz: f64) -> Result<()> {
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&hz) && !self.settings.contains_key("direct_samp") {
            log::warn!("Mock tuner: {} Hz is outside the R820T range", hz);
        }
        self.frequency = hz;
        Ok(())
    }

    fn sample_rate(&self) -> Result<f64> {
        Ok(self.sample_rate)
    }

    /// Rates below 1 Hz or not finite are ignored, like a dongle rejecting
    /// an unsupported rate
    fn set_sample_rate(&mut self, hz: f64) -> Result<()> {
        if !(hz >= MIN_SAMPLE_RATE_HZ && hz.is_finite()) {
            log::warn!(
                "Mock tuner: ignoring sample rate {} Hz, keeping {} Hz",
                hz,
                self.sample_rate
            );
            return Ok(());
        }
        self.sample_rate = hz;
        Ok(())
    }

    fn gain(&self) -> Result<f64> {
        Ok(self.gain)
    }

    fn set_gain(&mut self, db: f64) -> Result<()> {
        self.gain = db;
        Ok(())
    }

    fn set_gain_mode(&mut self, mode: GainMode) -> Result<()> {
        self.gain_mode = mode;
        Ok(())
    }

    fn write_setting(&mut self, key: &str, value: &str) -> Result<()> {
        log::debug!("Mock tuner setting {} = {}", key, value);
        self.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn activate_stream(&mut self) -> Result<()> {
        self.active = true;
        self.next_deadline = None;
        Ok(())
    }

    fn read_block(&mut self, block: &mut SampleBlock) -> Result<()> {
        if !self.active {
            return Err(Error::Device("stream not active".to_string()));
        }

        let amplitude = self.tone_amplitude();
        let step = TAU * self.config.tone_offset_hz / self.sample_rate;
        let stddev = self.config.noise_stddev;

        let buffer = block.buffer_mut();
        let complex_len = buffer.len() / 2;
        for pair in buffer.chunks_exact_mut(2) {
            let (ni, nq) = self.noise.complex(stddev);
            let i = amplitude * self.phase.cos() as f32 + ni;
            let q = amplitude * self.phase.sin() as f32 + nq;
            pair[0] = i.clamp(-1.0, 1.0);
            pair[1] = q.clamp(-1.0, 1.0);
            self.phase = (self.phase + step) % TAU;
        }
        block.set_filled(complex_len);

        if self.config.realtime {
            self.pace(complex_len)?;
        }
        self.blocks_read += 1;
        Ok(())
    }

    fn deactivate_stream(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn close_stream(&mut self) -> Result<()> {
        log::debug!("Mock tuner closed after {} blocks", self.blocks_read);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quiet_config() -> MockConfig {
        MockConfig {
            tone_offset_hz: 1000.0,
            amplitude: 0.5,
            noise_stddev: 0.0,
            random_seed: 42,
            realtime: false,
        }
    }

    #[test]
    fn test_read_requires_active_stream() {
        let mut radio = MockRadio::new(quiet_config());
        let mut block = SampleBlock::new(16);
        assert!(radio.read_block(&mut block).is_err());

        radio.activate_stream().unwrap();
        radio.read_block(&mut block).unwrap();
        assert_eq!(block.complex_len(), 16);
        assert_eq!(radio.blocks_read(), 1);

        radio.deactivate_stream().unwrap();
        assert!(radio.read_block(&mut block).is_err());
    }

    #[test]
    fn test_tone_has_configured_amplitude() {
        let mut radio = MockRadio::new(quiet_config());
        radio.activate_stream().unwrap();
        let mut block = SampleBlock::new(256);
        radio.read_block(&mut block).unwrap();

        for pair in block.samples().chunks_exact(2) {
            let mag = (pair[0].powi(2) + pair[1].powi(2)).sqrt();
            assert_relative_eq!(mag, 0.5, epsilon = 1e-5);
        }
        assert_eq!(block.samples()[0], 0.5);
        assert_eq!(block.samples()[1], 0.0);
    }

    #[test]
    fn test_manual_gain_scales_and_clips() {
        let mut radio = MockRadio::new(quiet_config());
        radio.activate_stream().unwrap();
        radio.set_gain_mode(GainMode::Manual).unwrap();
        radio.set_gain(24.0).unwrap();

        let mut block = SampleBlock::new(4);
        radio.read_block(&mut block).unwrap();
        assert_relative_eq!(block.samples()[0], 0.5 * 10f32.powf(-0.3), epsilon = 1e-5);

        radio.set_gain(60.0).unwrap();
        radio.read_block(&mut block).unwrap();
        assert!(block.samples().iter().all(|s| s.abs() <= 1.0));
        assert!(block.samples().iter().any(|s| s.abs() == 1.0));
    }

    #[test]
    fn test_settings_round_trip() {
        let mut radio = MockRadio::new(quiet_config());
        radio.set_frequency(433.92e6).unwrap();
        radio.set_sample_rate(1.024e6).unwrap();
        radio.write_setting("biastee", "true").unwrap();

        assert_eq!(radio.frequency().unwrap(), 433.92e6);
        assert_eq!(radio.sample_rate().unwrap(), 1.024e6);
        assert_eq!(radio.settings().get("biastee").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_invalid_sample_rate_is_ignored() {
        let mut radio = MockRadio::new(quiet_config());
        radio.set_sample_rate(1.024e6).unwrap();

        radio.set_sample_rate(0.0).unwrap();
        radio.set_sample_rate(-5.0).unwrap();
        radio.set_sample_rate(f64::NAN).unwrap();
        radio.set_sample_rate(1e-300).unwrap();
        assert_eq!(radio.sample_rate().unwrap(), 1.024e6);

        radio.activate_stream().unwrap();
        let mut block = SampleBlock::new(16);
        radio.read_block(&mut block).unwrap();
    }

    #[test]
    fn test_unpaceable_block_is_an_error() {
        let mut config = quiet_config();
        config.realtime = true;
        let mut radio = MockRadio::new(config);
        radio.activate_stream().unwrap();

        // Only reachable by bypassing set_sample_rate
        radio.sample_rate = 1e-300;
        let mut block = SampleBlock::new(1024);
        match radio.read_block(&mut block) {
            Err(Error::Device(msg)) => assert!(msg.contains("cannot pace")),
            other => panic!("expected a device error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_realtime_pacing() {
        let mut config = quiet_config();
        config.realtime = true;
        let mut radio = MockRadio::new(config);
        radio.set_sample_rate(100_000.0).unwrap();
        radio.activate_stream().unwrap();

        // 5 blocks × 1000 samples at 100 kHz = 50 ms
        let mut block = SampleBlock::new(1000);
        let start = Instant::now();
        for _ in 0..5 {
            radio.read_block(&mut block).unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}
