use std::process::ExitCode;

use anyhow::{Context, Result};
use ctxtrace::config::Config;
use ctxtrace::consumer::{RingConsumer, ShutdownReason};
use ctxtrace::log_entry::LogEntry;
use ctxtrace::probe::Probe;
use ctxtrace::publisher::Publisher;
use ctxtrace::signals;

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(ShutdownReason::Signal) => {
            log::info!("shut down on signal");
            ExitCode::SUCCESS
        }
        Ok(ShutdownReason::RegionFull) => {
            log::error!("shared log region filled up; exiting");
            ExitCode::FAILURE
        }
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ShutdownReason> {
    LogEntry::verify_layout().context("log entry layout check failed at startup")?;
    signals::install();

    let config = Config::from_env();
    log::info!(
        "starting, region {} ({} bytes)",
        config.region_path.display(),
        config.region_size
    );

    let probe = Probe::load().context("failed to load kernel probe")?;
    let mut publisher = Publisher::create(&config).context("failed to start shared log")?;

    let result = RingConsumer::new(probe, &mut publisher).run();

    if let Err(err) = publisher.shutdown() {
        log::error!("error during shutdown: {err:#}");
    }

    result
}
