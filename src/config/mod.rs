mod settings;

pub use settings::{Config, ExportConfig, EXAMPLE_CONFIG};
