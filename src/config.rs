use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use thiserror::Error;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 15;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

/// Payment gateway configuration. These fields gate adapter construction:
/// the service refuses to start without a secret key and callback base URL.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct GatewayConfig {
    /// Secret key used for API calls and webhook signature verification
    #[validate(length(min = 1))]
    pub secret_key: String,

    /// Publishable key handed to the storefront frontend
    #[serde(default)]
    pub public_key: String,

    /// Base URL of the provider API
    #[validate(url)]
    pub base_url: String,

    /// Base URL the provider redirects the shopper back to
    #[validate(url)]
    pub callback_base_url: String,

    /// Bounded timeout for session-init and verify calls; a timeout is
    /// reported as GatewayUnavailable, never as success
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum accepted age of a signed webhook timestamp
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: u64,
}

/// Toggles for alerts delegated to the email collaborator.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NotificationConfig {
    #[serde(default)]
    pub low_stock_alerts: bool,

    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i32,

    #[serde(default)]
    pub admin_order_alerts: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            low_stock_alerts: false,
            low_stock_threshold: default_low_stock_threshold(),
            admin_order_alerts: false,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
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

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[validate]
    pub gateway: GatewayConfig,

    #[serde(default)]
    #[validate]
    pub notifications: NotificationConfig,
}

impl AppConfig {
    /// Direct constructor used by tests and tooling.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database_url: String,
        host: String,
        port: u16,
        environment: String,
        gateway_secret_key: String,
        gateway_base_url: String,
        callback_base_url: String,
    ) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            gateway: GatewayConfig {
                secret_key: gateway_secret_key,
                public_key: String::new(),
                base_url: gateway_base_url,
                callback_base_url,
                timeout_secs: default_gateway_timeout_secs(),
                webhook_tolerance_secs: default_webhook_tolerance_secs(),
            },
            notifications: NotificationConfig::default(),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads configuration from layered files plus `APP__`-prefixed environment
/// overrides (e.g. `APP__GATEWAY__SECRET_KEY`).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let config = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(File::with_name(&format!("{}/local", CONFIG_DIR)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;

    info!(environment = %app_config.environment, "Configuration loaded");
    Ok(app_config)
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}

fn default_db_min_connections() -> u32 {
    2
}

fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}

fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_low_stock_threshold() -> i32 {
    DEFAULT_LOW_STOCK_THRESHOLD
}
