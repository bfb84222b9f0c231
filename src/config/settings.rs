use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the library)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Exporter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bundle identifier selected at startup
    pub default_app: String,
    /// Log filter directive used when RUST_LOG is unset
    pub log_level: String,
    /// Export engine settings
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Prefix joined with the bundle identifier to form a record domain
    pub domain_prefix: String,
    /// Records between two progress updates
    pub progress_interval: usize,
    /// Characters of the backup identifier kept in the folder name
    pub name_prefix_len: usize,
    /// Date suffix format for the folder name
    pub date_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_app: "com.tencent.xin".into(),
            log_level: "info".into(),
            export: ExportConfig::default(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            domain_prefix: "AppDomain-".into(),
            progress_interval: 500,
            name_prefix_len: 8,
            date_format: "%Y%m%d".into(),
        }
    }
}

/// TOML representation of the export section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlExportConfig {
    pub domain_prefix: Option<String>,
    pub progress_interval: Option<usize>,
    pub name_prefix_len: Option<usize>,
    pub date_format: Option<String>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub default_app: Option<String>,
    pub log_level: Option<String>,
    pub export: Option<TomlExportConfig>,
}

impl Config {
    /// Load configuration from the data directory, merging with defaults
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Load configuration from `config_file`, writing the bundled example
    /// there first if it does not exist
    pub fn load_from(config_file: &Path) -> Self {
        if !config_file.exists() {
            Self::create_default_config(config_file);
        }

        match fs::read_to_string(config_file) {
            Ok(contents) => Self::from_toml_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %config_file.display(),
                    error = %e,
                    "Ignoring malformed config file"
                );
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }

    /// Parse a config document and merge it over the defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let toml_config: TomlConfig = toml::from_str(contents)?;
        let mut config = Config::default();

        if let Some(app) = toml_config.default_app.filter(|a| !a.is_empty()) {
            config.default_app = app;
        }
        if let Some(level) = toml_config.log_level {
            config.log_level = level;
        }

        if let Some(export) = toml_config.export {
            if let Some(prefix) = export.domain_prefix {
                config.export.domain_prefix = prefix;
            }
            // A zero interval would never report progress
            if let Some(interval) = export.progress_interval.filter(|n| *n > 0) {
                config.export.progress_interval = interval;
            }
            if let Some(len) = export.name_prefix_len.filter(|n| *n > 0) {
                config.export.name_prefix_len = len;
            }
            if let Some(format) = export.date_format {
                config.export.date_format = format;
            }
        }

        Ok(config)
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "Failed to create config directory");
                return;
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(error = %e, "Failed to write default config");
        }
    }

    pub fn with_default_app(mut self, app: impl Into<String>) -> Self {
        self.default_app = app.into();
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.export.progress_interval = interval.max(1);
        self
    }
}
