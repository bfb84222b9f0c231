//! File logging setup

use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::config::Config;

use super::paths::{log_file_path, logs_dir};

/// Install the global subscriber writing to ~/.ibe/logs/ibe.log.
///
/// Returns `Ok(false)` when a subscriber was already installed.
pub fn init(config: &Config) -> std::io::Result<bool> {
    fs::create_dir_all(logs_dir())?;
    init_with_file(config, &log_file_path())
}

/// Install the global subscriber writing to `path`
pub fn init_with_file(config: &Config, path: &Path) -> std::io::Result<bool> {
    let log_file = OpenOptions::new().create(true).append(true).open(path)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false) // Disable ANSI colors in log file
        .try_init()
        .is_ok();

    Ok(installed)
}
