pub mod config_cmd;
pub mod memory;

use std::path::Path;

use wayfarer_config::AppConfig;

/// Load configuration from `path`, or from the default location. Environment
/// overrides apply either way.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_file(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}
