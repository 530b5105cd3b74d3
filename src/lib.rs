//! TarangIO - rtl_tcp compatible I/Q streaming server
//!
//! Reads complex float samples from a tuner and serves them to any number of
//! rtl_tcp clients (SDR#, GQRX, rtl_433 ...) over TCP, while optionally
//! recording them to a file and showing a peak meter.
//!
//! ## Protocol
//!
//! - On connect the server sends a 12-byte dongle info header
//!   (`"RTL0"`, tuner type, gain count).
//! - Clients then receive a continuous stream of samples, either legacy
//!   unsigned bytes (`I, Q, I, Q ...` centred on 128) or native `f32` pairs.
//! - Clients may send 5-byte commands at any time: opcode plus big-endian
//!   `u32` parameter. Frequency, sample rate, gain mode and gain are applied
//!   to the tuner; everything else is logged and ignored.

pub mod cli;
pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod meter;
pub mod recorder;
pub mod server;
pub mod streaming;

pub use config::Config;
pub use error::{Error, Result};
pub use server::{CycleReport, Server};
