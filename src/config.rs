use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_COUNTER_MAX_RETRIES: u32 = 3;
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_ORPHAN_MAX_AGE_SECS: u64 = 3600;
const DEFAULT_REPORT_CHECK_INTERVAL_SECS: u64 = 86_400;

/// Application configuration with validation.
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
    #[serde(default = "default_env")]
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

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// ISO currency code used for checkout sessions
    #[serde(default = "default_currency")]
    #[validate(length(min = 3, max = 3))]
    pub currency: String,

    /// Payment gateway base URL. When unset the sandbox gateway is used.
    #[serde(default)]
    pub payment_gateway_url: Option<String>,

    /// API key sent to the payment gateway
    #[serde(default)]
    pub payment_api_key: Option<String>,

    /// Secret used to verify inbound payment notifications
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Allowed clock skew for webhook signature timestamps (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub payment_webhook_tolerance_secs: u64,

    /// Timeout for outbound gateway calls (seconds)
    #[serde(default = "default_gateway_timeout_secs")]
    pub payment_gateway_timeout_secs: u64,

    /// URL the gateway redirects to after a successful payment
    #[serde(default = "default_success_url")]
    pub payment_success_url: String,

    /// URL the gateway redirects to after an abandoned payment
    #[serde(default = "default_cancel_url")]
    pub payment_cancel_url: String,

    /// HTTP mail relay endpoint. When unset, email delivery is disabled.
    #[serde(default)]
    pub mail_relay_url: Option<String>,

    /// From address for outbound mail
    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    /// Retry budget for optimistic counter updates
    #[serde(default = "default_counter_max_retries")]
    pub counter_max_retries: u32,

    /// Age after which a PENDING order with no checkout session is cancelled
    #[serde(default = "default_orphan_max_age_secs")]
    pub orphan_max_age_secs: u64,

    /// How often the monthly report task checks for an unsent period
    #[serde(default = "default_report_check_interval_secs")]
    pub report_check_interval_secs: u64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_env() -> String {
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
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}
fn default_success_url() -> String {
    "http://localhost:8080/api/v1/orders/confirm".to_string()
}
fn default_cancel_url() -> String {
    "http://localhost:8080/api/v1/orders/cancelled".to_string()
}
fn default_mail_from() -> String {
    "orders@storefront.example".to_string()
}
fn default_counter_max_retries() -> u32 {
    DEFAULT_COUNTER_MAX_RETRIES
}
fn default_orphan_max_age_secs() -> u64 {
    DEFAULT_ORPHAN_MAX_AGE_SECS
}
fn default_report_check_interval_secs() -> u64 {
    DEFAULT_REPORT_CHECK_INTERVAL_SECS
}

impl AppConfig {
    /// Minimal constructor used by tests and tools.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            currency: default_currency(),
            payment_gateway_url: None,
            payment_api_key: None,
            payment_webhook_secret: None,
            payment_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            payment_gateway_timeout_secs: default_gateway_timeout_secs(),
            payment_success_url: default_success_url(),
            payment_cancel_url: default_cancel_url(),
            mail_relay_url: None,
            mail_from: default_mail_from(),
            counter_max_retries: default_counter_max_retries(),
            orphan_max_age_secs: default_orphan_max_age_secs(),
            report_check_interval_secs: default_report_check_interval_secs(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }
}

/// Loads configuration from layered files plus `APP__`-prefixed environment
/// variables (e.g. `APP__DATABASE_URL`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = std::env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    info!(
        environment = %app_config.environment,
        port = app_config.port,
        "configuration loaded"
    );
    Ok(app_config)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
