pub mod budget;
pub mod config_cmd;
pub mod demo;

use std::path::Path;

use turnwise_config::{AppConfig, ConfigError};

/// Load from `path` when given, otherwise from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    }
}
