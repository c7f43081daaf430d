//! Application configuration: TOML file, defaults and validation.

mod file;
mod types;
mod validate;

pub use file::{config_file_path, load_default_config, save_default_config};
pub use types::{Config, DefaultsConfig, OutputConfig};
pub use validate::validate_config;
