//! Device implementations

pub mod mock;

use crate::config::Config;
use crate::core::driver::Radio;
use crate::error::{Error, Result};
use mock::MockRadio;

/// Create a tuner driver based on configuration
pub fn create_device(config: &Config) -> Result<Box<dyn Radio>> {
    match config.device.driver.as_str() {
        "mock" => {
            log::info!(
                "Mock tuner: tone at +{} Hz, noise σ={}",
                config.device.mock.tone_offset_hz,
                config.device.mock.noise_stddev
            );
            Ok(Box::new(MockRadio::new(config.device.mock.clone())))
        }
        _ => Err(Error::UnknownDevice(config.device.driver.clone())),
    }
}
