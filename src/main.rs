//! TarangIO daemon
//!
//! ```text
//! tarang-io --freq 100e6 --rate 2.048e6 --gain 20
//! tarang-io -c /etc/tarang.toml --freeze
//! ```

use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tarang_io::cli::Cli;
use tarang_io::devices::create_device;
use tarang_io::{Error, Result, Server};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    log::info!("TarangIO v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &cli.config {
        log::info!("Using config: {}", path.display());
    }
    let config = cli.load_config()?;

    log::info!("Device driver: {}", config.device.driver);
    let radio = create_device(&config)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut server = Server::start(&config, radio)?;
    server.run(&running)?;

    log::info!("TarangIO stopped");
    Ok(())
}
