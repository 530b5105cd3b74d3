//! Core abstractions for tuner drivers.
//!
//! - [`driver::Radio`]: Trait to implement for new hardware
//! - [`types`]: Sample blocks, settings and wire format selection

pub mod driver;
pub mod types;
