use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::mpsc::channel;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

mod actions;
mod browser;
mod config;
mod error;
mod locator;
mod monitor;
mod portal;
mod probe;
mod ssid;

fn main() -> Result<(), ConfigError> {
    let config_file_path = config::find_config_file(config::CONFIG_FILE_NAME)?;
    let config = config::read_config(&config_file_path)?;
    init_logging(&config.log_path)?;
    info!(path = %config_file_path.display(), "config loaded");

    let (tx, rx) = channel();
    ctrlc::set_handler(move || tx.send(()).expect("Could not send signal on channel."))
        .expect("Error setting Ctrl-C handler");

    monitor::monitor_loop(&config, rx);

    Ok(())
}

/// One line per event, to stdout and appended to the portal log file. The
/// level comes from RUST_LOG, defaulting to info.
fn init_logging(log_path: &Path) -> Result<(), io::Error> {
    let log_file = OpenOptions::new().append(true).create(true).open(log_path)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(io::stdout.and(Arc::new(log_file)))
        .init();
    Ok(())
}
