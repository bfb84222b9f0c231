//! Where the exporter keeps its config and logs
//!
//! Everything lives under one data directory, `~/.ibe` unless the embedding
//! application picks another one at startup.

use std::path::PathBuf;
use std::sync::OnceLock;

const DEFAULT_DIR_NAME: &str = ".ibe";

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Pin the data directory for the rest of the process.
///
/// Returns `false` if it was already pinned; the first value wins.
pub fn init_data_dir(custom_path: Option<PathBuf>) -> bool {
    let path = custom_path.unwrap_or_else(home_data_dir);
    let pinned = DATA_DIR.set(path).is_ok();
    if !pinned {
        tracing::debug!(current = %data_dir().display(), "Data directory already pinned");
    }
    pinned
}

fn home_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(DEFAULT_DIR_NAME),
        None => PathBuf::from(DEFAULT_DIR_NAME),
    }
}

pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(home_data_dir)
}

pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn log_file_path() -> PathBuf {
    logs_dir().join("ibe.log")
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}
