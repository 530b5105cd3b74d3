//! Server loop
//!
//! Ties the tuner, the recorder, the peak meter and the rtl_tcp network side
//! together in one single-threaded loop. The device read is the only
//! blocking call; everything else runs on zero-timeout readiness.
//!
//! # Cycle
//!
//! ```text
//! read block → record → meter → tick += 1
//!   └─ every (skip + 1) ticks:
//!        poll → teardown erroring → broadcast → accept one → receive → dispatch
//! ```
//!
//! Commands received in cycle K only reach the tuner after the block of
//! cycle K has already been broadcast.

use crate::config::Config;
use crate::core::driver::Radio;
use crate::core::types::{GainMode, SampleBlock, Settings};
use crate::error::Result;
use crate::meter::{MeterStyle, PeakMeter, TelemetrySink, TerminalSink};
use crate::recorder::SampleRecorder;
use crate::streaming::{
    BroadcastStats, Broadcaster, ClientId, CommandDispatcher, ConnectionMux, Dispatch, Inbound,
    encode_handshake,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

/// What happened during one [`Server::cycle`]
#[derive(Debug, Default, Clone)]
pub struct CycleReport {
    /// Complex samples read from the tuner
    pub samples: usize,
    /// Network processing ran this cycle
    pub networked: bool,
    /// Clients removed because poll flagged them as erroring
    pub torn_down: usize,
    pub broadcast: BroadcastStats,
    pub accepted: Option<ClientId>,
    pub dispatched: Vec<(Inbound, Dispatch)>,
    /// Peak meter report, if one was due
    pub level_dbfs: Option<f64>,
}

/// Streaming server around one tuner
pub struct Server<R: Radio> {
    radio: R,
    dispatcher: CommandDispatcher,
    mux: Option<ConnectionMux>,
    broadcaster: Broadcaster,
    meter: Option<PeakMeter<Box<dyn TelemetrySink>>>,
    recorder: SampleRecorder,
    block: SampleBlock,
    tick: u64,
    stopped: bool,
}

impl<R: Radio> Server<R> {
    /// Activate the tuner, apply startup settings and bind the listener
    ///
    /// If anything after stream activation fails the stream is released
    /// again before the error is returned.
    pub fn start(config: &Config, mut radio: R) -> Result<Self> {
        radio.activate_stream()?;

        let (settings, recorder, mux) = match prepare(config, &mut radio) {
            Ok(parts) => parts,
            Err(e) => {
                release(&mut radio);
                return Err(e);
            }
        };

        let meter = config.meter.enabled.then(|| {
            let style = MeterStyle::from_dumb_flag(config.meter.dumb_terminal);
            let sink: Box<dyn TelemetrySink> = Box::new(TerminalSink::stderr(style));
            PeakMeter::new(config.meter.refresh_secs, sink)
        });

        Ok(Self {
            radio,
            broadcaster: Broadcaster::new(settings.wire_format),
            dispatcher: CommandDispatcher::new(settings),
            mux,
            meter,
            recorder,
            block: SampleBlock::new(config.device.block_size),
            tick: 0,
            stopped: false,
        })
    }

    /// Route meter reports somewhere other than the terminal
    ///
    /// No effect when the meter is disabled.
    pub fn with_meter_sink(mut self, sink: Box<dyn TelemetrySink>) -> Self {
        self.meter = self
            .meter
            .take()
            .map(|meter| PeakMeter::new(meter.refresh_secs(), sink));
        self
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn settings(&self) -> &Settings {
        self.dispatcher.settings()
    }

    pub fn mux(&self) -> Option<&ConnectionMux> {
        self.mux.as_ref()
    }

    /// Listener address, `None` when the network side is disabled
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.mux.as_ref().map(ConnectionMux::local_addr)
    }

    /// Device reads so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn bytes_recorded(&self) -> u64 {
        self.recorder.bytes_written()
    }

    /// One device read plus, on every `(skip + 1)`-th tick, one network cycle
    ///
    /// Any error is fatal: it comes from the tuner, the recorder or the
    /// poll itself, never from a client connection.
    pub fn cycle(&mut self) -> Result<CycleReport> {
        self.radio.read_block(&mut self.block)?;
        self.recorder.write_block(self.block.samples())?;

        let mut report = CycleReport {
            samples: self.block.complex_len(),
            ..Default::default()
        };

        if let Some(meter) = &mut self.meter {
            let rate = self.dispatcher.settings().sample_rate_hz;
            report.level_dbfs = meter.observe(self.block.samples(), rate);
        }

        self.tick += 1;
        let period = u64::from(self.dispatcher.settings().skip) + 1;
        if self.tick % period == 0 {
            self.network_cycle(&mut report)?;
        }

        Ok(report)
    }

    fn network_cycle(&mut self, report: &mut CycleReport) -> Result<()> {
        let Some(mux) = self.mux.as_mut() else {
            return Ok(());
        };
        report.networked = true;

        mux.poll()?;
        report.torn_down = mux.teardown_erroring();
        report.broadcast = self.broadcaster.broadcast(mux, self.block.samples());
        report.accepted = mux.accept_if_ready();

        for inbound in mux.receive() {
            log::debug!(
                "Command {} from {} ({})",
                inbound.command.name(),
                inbound.peer,
                inbound.client
            );
            let outcome = self.dispatcher.dispatch(&mut self.radio, inbound.command)?;
            report.dispatched.push((inbound, outcome));
        }

        Ok(())
    }

    /// Cycle until `running` is cleared or a fatal error occurs
    ///
    /// Shutdown runs either way; the first error wins.
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        log::info!("Streaming. Press Ctrl-C to stop.");

        let result = loop {
            if !running.load(Ordering::Relaxed) {
                break Ok(());
            }
            if let Err(e) = self.cycle() {
                log::error!("Fatal error after {} reads: {}", self.tick, e);
                break Err(e);
            }
        };

        let shutdown = self.shutdown();
        result.and(shutdown)
    }

    /// Close the recorder, every socket and the tuner stream
    ///
    /// Only the first call does anything.
    pub fn shutdown(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.stopped, true) {
            return Ok(());
        }
        log::info!("Shutting down after {} reads", self.tick);

        let recorded = self.recorder.finish();
        if let Some(mux) = &mut self.mux {
            mux.shutdown_all();
        }
        let deactivated = self.radio.deactivate_stream();
        let closed = self.radio.close_stream();

        recorded.and(deactivated).and(closed)
    }
}

/// Startup work between stream activation and the first read
fn prepare<R: Radio>(
    config: &Config,
    radio: &mut R,
) -> Result<(Settings, SampleRecorder, Option<ConnectionMux>)> {
    tune(config, radio)?;
    write_vendor_settings(config, radio)?;

    let settings = read_settings(config, radio)?;
    log::info!("Center frequency is {:.3} MHz", settings.frequency_hz / 1e6);
    log::info!("Sampling rate is {:.3} MHz", settings.sample_rate_hz / 1e6);
    log::info!("Gain is {} dB", settings.gain_db);
    if settings.frozen {
        log::info!("Settings frozen, client commands will be ignored");
    }

    let mux = if config.network.enabled {
        let mux = ConnectionMux::bind(config.listen_address(), encode_handshake())?;
        log::info!(
            "rtl_tcp server on {} ({:?} samples, skip {})",
            mux.local_addr(),
            settings.wire_format,
            settings.skip
        );
        Some(mux)
    } else {
        log::info!("rtl_tcp server disabled");
        None
    };

    let recorder = SampleRecorder::from_config(&config.output)?;

    Ok((settings, recorder, mux))
}

fn tune<R: Radio>(config: &Config, radio: &mut R) -> Result<()> {
    let device = &config.device;
    if let Some(hz) = device.frequency {
        radio.set_frequency(hz)?;
    }
    if let Some(hz) = device.sample_rate {
        radio.set_sample_rate(hz)?;
    }
    if let Some(db) = device.gain {
        radio.set_gain_mode(GainMode::Manual)?;
        radio.set_gain(db)?;
    }
    if device.auto_gain {
        radio.set_gain_mode(GainMode::Automatic)?;
    }
    Ok(())
}

fn write_vendor_settings<R: Radio>(config: &Config, radio: &mut R) -> Result<()> {
    let direct_sampling = config.direct_sampling()?;
    if direct_sampling.is_active() {
        radio.write_setting("direct_samp", direct_sampling.setting_value())?;
    }

    let device = &config.device;
    let switches = [
        ("iq_swap", device.iq_swap),
        ("biastee", device.bias_tee),
        ("digital_agc", device.digital_agc),
        ("offset_tune", device.offset_tune),
    ];
    for (key, enabled) in switches {
        if enabled {
            radio.write_setting(key, "true")?;
        }
    }
    Ok(())
}

fn read_settings<R: Radio>(config: &Config, radio: &R) -> Result<Settings> {
    let gain_mode = if config.device.auto_gain {
        Some(GainMode::Automatic)
    } else if config.device.gain.is_some() {
        Some(GainMode::Manual)
    } else {
        None
    };

    Ok(Settings {
        frequency_hz: radio.frequency()?,
        sample_rate_hz: radio.sample_rate()?,
        gain_db: radio.gain()?,
        gain_mode,
        frozen: config.network.freeze,
        direct_sampling: config.direct_sampling()?,
        wire_format: config.wire_format(),
        skip: config.network.skip,
    })
}

/// Best-effort stream release on a failed start
fn release<R: Radio>(radio: &mut R) {
    if let Err(e) = radio.deactivate_stream() {
        log::warn!("Failed to deactivate stream: {}", e);
    }
    if let Err(e) = radio.close_stream() {
        log::warn!("Failed to close stream: {}", e);
    }
}
