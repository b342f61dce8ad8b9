use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;
use validator::Validate;

const CONFIG_DIR: &str = "config";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;

/// Application configuration, layered from config files and `APP__`-prefixed
/// environment variables. Constructed once at startup and injected into
/// every component; there is no global configuration state.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// Shared secret the payment provider sends in `x-callback-token`
    #[validate(length(min = 16))]
    pub webhook_callback_token: String,

    /// Payment provider identifier recorded in the webhook ledger
    #[serde(default = "default_payment_provider")]
    pub payment_provider: String,

    /// Payment gateway base URL for the invoice adapter
    #[serde(default)]
    pub gateway_base_url: Option<String>,

    /// Payment gateway API key
    #[serde(default)]
    pub gateway_api_key: Option<String>,

    /// Currency for all sessions and orders (minor units)
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Checkout session time-to-live in minutes
    #[serde(default = "default_session_ttl_minutes")]
    pub session_ttl_minutes: i64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_payment_provider() -> String {
    "xendit".to_string()
}
fn default_currency() -> String {
    "IDR".to_string()
}
fn default_session_ttl_minutes() -> i64 {
    30
}
fn default_event_channel_capacity() -> usize {
    1024
}

impl AppConfig {
    /// Minimal constructor used by the test harness.
    pub fn new(database_url: String, webhook_callback_token: String, port: u16) -> Self {
        Self {
            database_url,
            host: "127.0.0.1".to_string(),
            port,
            environment: "test".to_string(),
            log_level: default_log_level(),
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            webhook_callback_token,
            payment_provider: default_payment_provider(),
            gateway_base_url: None,
            gateway_api_key: None,
            currency: default_currency(),
            session_ttl_minutes: default_session_ttl_minutes(),
            event_channel_capacity: 64,
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Loads configuration from `config/default.toml`, an environment-specific
/// overlay, and `APP__`-prefixed environment variables (highest precedence).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_path = Path::new(CONFIG_DIR).join("default.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }
    let env_path = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
    if env_path.exists() {
        builder = builder.add_source(File::from(env_path));
    }

    let cfg: AppConfig = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    info!(environment = %cfg.environment, "Configuration loaded");
    Ok(cfg)
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured
/// level.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("storefront_api={log_level},tower_http=info")));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_applies_defaults() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "super-secret-callback-token".into(),
            0,
        );
        assert_eq!(cfg.currency, "IDR");
        assert_eq!(cfg.session_ttl_minutes, 30);
        assert_eq!(cfg.payment_provider, "xendit");
        assert!(!cfg.is_development());
    }

    #[test]
    fn short_callback_token_fails_validation() {
        let cfg = AppConfig::new("sqlite::memory:".into(), "short".into(), 0);
        assert!(cfg.validate().is_err());
    }
}
