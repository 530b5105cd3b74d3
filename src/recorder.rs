//! Raw cf32 sample recorder
//!
//! Writes every block exactly as read from the tuner (native-endian `f32`
//! I/Q pairs) to an output file and/or standard output. Independent of the
//! network clients and of the wire format they receive.

use crate::config::OutputConfig;
use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Optional file and stdout sample sinks
pub struct SampleRecorder {
    file: Option<BufWriter<File>>,
    stdout: Option<io::Stdout>,
    bytes_written: u64,
    scratch: Vec<u8>,
}

impl SampleRecorder {
    /// Recorder that discards everything
    pub fn disabled() -> Self {
        Self {
            file: None,
            stdout: None,
            bytes_written: 0,
            scratch: Vec::new(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Result<Self> {
        let mut recorder = Self::disabled();
        if let Some(path) = &config.path {
            recorder.file = Some(open_output(path, config.append)?);
            log::info!(
                "Recording cf32 samples to {} ({})",
                path.display(),
                if config.append { "append" } else { "truncate" }
            );
        }
        if config.stdout {
            recorder.stdout = Some(io::stdout());
            log::info!("Writing cf32 samples to stdout");
        }
        Ok(recorder)
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some() || self.stdout.is_some()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append one block of interleaved samples to every sink
    pub fn write_block(&mut self, samples: &[f32]) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        self.scratch.clear();
        for s in samples {
            self.scratch.extend_from_slice(&s.to_ne_bytes());
        }

        if let Some(stdout) = &mut self.stdout {
            stdout.lock().write_all(&self.scratch)?;
        }
        if let Some(file) = &mut self.file {
            file.write_all(&self.scratch)?;
        }
        self.bytes_written += self.scratch.len() as u64;
        Ok(())
    }

    /// Flush and close all sinks
    pub fn finish(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            log::info!("Recorded {} bytes", self.bytes_written);
        }
        if let Some(stdout) = self.stdout.take() {
            stdout.lock().flush()?;
        }
        Ok(())
    }
}

fn open_output(path: &Path, append: bool) -> Result<BufWriter<File>> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    Ok(BufWriter::new(options.open(path)?))
}
