use serde::Deserialize;
use std::env;

/// Configuration settings for the attack comparison service
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Counter table configuration
    pub storage: StorageConfig,
    /// Daily rate limit configuration
    pub rate_limit: RateLimitConfig,
    /// Language model configuration
    pub model: ModelConfig,
}

/// Server configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind the server to
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

/// Counter table settings
///
/// `table_service_uri` and `connection_string` are alternatives. The URI
/// implies identity-based auth, the connection string carries its own
/// credentials. The URI wins when both are set.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Name of the table holding the daily counters
    pub table_name: String,
    /// Table service endpoint, e.g. `https://account.table.core.windows.net`
    pub table_service_uri: Option<String>,
    /// Storage account connection string
    pub connection_string: Option<String>,
}

/// Rate limiting configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per day across all callers
    pub global_daily_limit: i64,
    /// Requests allowed per day for a single caller
    pub caller_daily_limit: i64,
}

/// Language model settings
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// API key; requests fail with a configuration error while unset
    pub api_key: Option<String>,
    /// Model identifier
    pub name: String,
    /// Base URL of the generative language API
    pub base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table_name: "RateLimits".to_string(),
            table_service_uri: None,
            connection_string: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_daily_limit: 50,
            caller_daily_limit: 5,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            name: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7071,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            rate_limit: RateLimitConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Settings {
    /// Load configuration from defaults, a `.env` file and environment variables
    ///
    /// `APP_`-prefixed variables use `__` for nesting, e.g.
    /// `APP_RATE_LIMIT__CALLER_DAILY_LIMIT=10`. The hosting platform's own
    /// variable names fill whatever is still unset afterwards.
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let defaults = Settings::default();

        let builder = config::Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("storage.table_name", defaults.storage.table_name)?
            .set_default("rate_limit.global_daily_limit", defaults.rate_limit.global_daily_limit)?
            .set_default("rate_limit.caller_daily_limit", defaults.rate_limit.caller_daily_limit)?
            .set_default("model.name", defaults.model.name)?
            .set_default("model.base_url", defaults.model.base_url)?
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.apply_platform_env();
        Ok(settings)
    }

    /// Fill unset values from the hosting platform's variable names
    fn apply_platform_env(&mut self) {
        if self.storage.table_service_uri.is_none() {
            self.storage.table_service_uri = non_empty_var("AzureWebJobsStorage__tableServiceUri");
        }
        if self.storage.connection_string.is_none() {
            self.storage.connection_string = non_empty_var("AzureWebJobsStorage");
        }
        if self.model.api_key.is_none() {
            self.model.api_key = non_empty_var("GEMINI_API_KEY");
        }
        if let Some(port) = non_empty_var("FUNCTIONS_CUSTOMHANDLER_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
