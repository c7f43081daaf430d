//! Configuration file loading and saving.

use crate::config::Config;
use crate::constants::APP_NAME;
use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Platform config file path, e.g. `~/.config/wildeval/config.toml`.
pub fn config_file_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", APP_NAME).ok_or(Error::ConfigDirNotFound)?;
    Ok(dirs.config_dir().join("config.toml"))
}

/// Load the default config file, falling back to defaults when absent.
pub fn load_default_config() -> Result<Config> {
    let path = config_file_path()?;
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
        path: path.clone(),
        source,
    })?;
    let config = toml::from_str(&content).map_err(|source| Error::ConfigParse { path, source })?;

    crate::config::validate_config(&config)?;
    Ok(config)
}

/// Save the config to the default location, creating parent directories.
pub fn save_default_config(config: &Config) -> Result<PathBuf> {
    let path = config_file_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config).map_err(|source| Error::ConfigSerialize { source })?;
    std::fs::write(&path, content).map_err(|source| Error::ConfigWrite {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
