//! Peak level meter
//!
//! Tracks the largest absolute I or Q component seen since the last report.
//! Once more than `sample_rate × refresh_secs` complex samples have been
//! observed, the peak is reported in dBFS and both accumulators reset:
//!
//! ```text
//! level = 20 · log10(peak + 1e-99)
//! ```
//!
//! The epsilon keeps an all-zero block finite (about -1980 dBFS).

use std::io::{self, Write};

/// Guards `log10(0)`
pub const LEVEL_EPSILON: f64 = 1e-99;

/// Peak magnitude in dBFS
#[inline]
pub fn peak_dbfs(peak: f32) -> f64 {
    20.0 * (f64::from(peak) + LEVEL_EPSILON).log10()
}

/// Receives meter reports
pub trait TelemetrySink {
    fn emit(&mut self, level_dbfs: f64);
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Box<S> {
    fn emit(&mut self, level_dbfs: f64) {
        (**self).emit(level_dbfs)
    }
}

impl TelemetrySink for Vec<f64> {
    fn emit(&mut self, level_dbfs: f64) {
        self.push(level_dbfs);
    }
}

/// Terminal rendering of a level report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterStyle {
    /// One line per report
    Plain,
    /// Redraw a single status line in place
    Cursor,
}

impl MeterStyle {
    pub fn from_dumb_flag(dumb_terminal: bool) -> Self {
        if dumb_terminal {
            MeterStyle::Plain
        } else {
            MeterStyle::Cursor
        }
    }

    pub fn format(self, level_dbfs: f64) -> String {
        match self {
            MeterStyle::Plain => format!("{:6.1}\n", level_dbfs),
            MeterStyle::Cursor => format!("\x1b[2K{:6.1} dBFS\r", level_dbfs),
        }
    }
}

/// Writes level reports to a terminal stream
pub struct TerminalSink<W: Write> {
    out: W,
    style: MeterStyle,
}

impl TerminalSink<io::Stderr> {
    pub fn stderr(style: MeterStyle) -> Self {
        Self::new(io::stderr(), style)
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W, style: MeterStyle) -> Self {
        Self { out, style }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TelemetrySink for TerminalSink<W> {
    fn emit(&mut self, level_dbfs: f64) {
        let line = self.style.format(level_dbfs);
        if let Err(e) = self
            .out
            .write_all(line.as_bytes())
            .and_then(|_| self.out.flush())
        {
            log::debug!("Failed to write peak meter: {}", e);
        }
    }
}

/// Running peak accumulator with periodic reports
pub struct PeakMeter<S: TelemetrySink> {
    refresh_secs: f64,
    peak: f32,
    samples: u64,
    sink: S,
}

impl<S: TelemetrySink> PeakMeter<S> {
    pub fn new(refresh_secs: f64, sink: S) -> Self {
        Self {
            refresh_secs,
            peak: 0.0,
            samples: 0,
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn refresh_secs(&self) -> f64 {
        self.refresh_secs
    }

    /// Current peak since the last report
    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Complex samples since the last report
    pub fn pending_samples(&self) -> u64 {
        self.samples
    }

    /// Account for one block of interleaved samples
    ///
    /// Returns the reported level when this block crossed the threshold.
    pub fn observe(&mut self, samples: &[f32], sample_rate_hz: f64) -> Option<f64> {
        self.peak = samples.iter().fold(self.peak, |m, s| m.max(s.abs()));
        self.samples += (samples.len() / 2) as u64;

        if self.samples as f64 > sample_rate_hz * self.refresh_secs {
            let level = peak_dbfs(self.peak);
            self.sink.emit(level);
            self.samples = 0;
            self.peak = 0.0;
            Some(level)
        } else {
            None
        }
    }
}
