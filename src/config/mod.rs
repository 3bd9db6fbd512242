//! Configuration management for the attack comparison service.
//! This module handles loading and managing configuration settings
//! from environment variables and `.env` files.

mod settings;

pub use settings::{Settings, ServerConfig, StorageConfig, RateLimitConfig, ModelConfig};

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, config::ConfigError>;

/// Load the application configuration
pub fn load_config() -> ConfigResult<Settings> {
    Settings::load()
}
