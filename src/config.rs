use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::common::BusinessClock;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TIMEZONE: &str = "Asia/Kuala_Lumpur";
const CONFIG_DIR: &str = "config";
pub const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Flat variables used by existing deployments, mapped onto nested keys.
const FLAT_ENV_OVERRIDES: [(&str, &str); 9] = [
    ("PAYMENT_GATEWAY_URL", "payment.gateway_url"),
    ("PAYMENT_API_KEY", "payment.api_key"),
    ("PAYMENT_AG_TOKEN", "payment.ag_token"),
    ("ZOO_BASE_URL", "zoo.base_url"),
    ("ZOO_USER", "zoo.user"),
    ("ZOO_PASS", "zoo.password"),
    ("MALAYSIA_TZ", "timezone"),
    ("SWEEP_INTERVAL", "delivery.sweep_interval_secs"),
    ("SWEEP_BATCH", "delivery.sweep_batch"),
];

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    /// Comma-separated list of allowed CORS origins; empty allows any
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct DatabaseConfig {
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,
}

/// Payment gateway (JP gateway) endpoints and credentials
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct PaymentConfig {
    #[validate(length(min = 1))]
    pub gateway_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub ag_token: String,
    /// Path on the gateway the buyer's browser posts the redirect form to
    #[serde(default = "default_redirect_path")]
    pub redirect_path: String,
    #[serde(default = "default_short_timeout_secs")]
    pub bank_list_timeout_secs: u64,
    #[serde(default = "default_long_timeout_secs")]
    pub payment_timeout_secs: u64,
}

impl PaymentConfig {
    pub fn bank_list_timeout(&self) -> Duration {
        Duration::from_secs(self.bank_list_timeout_secs)
    }
}

/// External ticket-issuance API
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ZooConfig {
    #[validate(length(min = 1))]
    pub base_url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_short_timeout_secs")]
    pub token_timeout_secs: u64,
    #[serde(default = "default_long_timeout_secs")]
    pub issuance_timeout_secs: u64,
    /// Overwrite stored line prices with the issuer's returned price
    #[serde(default)]
    pub trust_issuer_price: bool,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct DeliveryConfig {
    #[serde(default = "default_sweep_interval_secs")]
    #[validate(range(min = 1))]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_sweep_batch")]
    #[validate(range(min = 1, max = 50))]
    pub sweep_batch: u64,
    /// First hold-off after a failed delivery; doubles per attempt up to an hour
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_true_bool")]
    pub enabled: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_batch: default_sweep_batch(),
            retry_backoff_secs: default_retry_backoff_secs(),
            enabled: true,
        }
    }
}

impl DeliveryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

/// SMTP settings. Without a host, mail is logged instead of sent.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct MailConfig {
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_from_email")]
    #[validate(email)]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    #[validate]
    pub server: ServerConfig,
    #[validate]
    pub database: DatabaseConfig,

    /// Shared HS256 secret used to verify member tokens
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    #[validate]
    pub payment: PaymentConfig,
    #[validate]
    pub zoo: ZooConfig,
    #[serde(default)]
    #[validate]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    #[validate]
    pub mail: MailConfig,

    /// IANA zone used for gateway-facing timestamps
    #[serde(default = "default_timezone")]
    #[validate(custom = "validate_timezone")]
    pub timezone: String,
}

impl AppConfig {
    pub fn database_url(&self) -> &str {
        &self.database.database_url
    }

    pub fn is_development(&self) -> bool {
        self.server.environment.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        &self.server.log_level
    }

    pub fn clock(&self) -> BusinessClock {
        BusinessClock::from_name(&self.timezone).unwrap_or_else(|_| {
            warn!(timezone = %self.timezone, "unknown timezone; using {}", DEFAULT_TIMEZONE);
            BusinessClock::default()
        })
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.server
            .cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET to a unique, secure value."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.mail.smtp_host.is_some() && self.mail.smtp_user.trim().is_empty() {
            let mut err = ValidationError::new("smtp_user_required");
            err.message = Some("mail.smtp_user is required when mail.smtp_host is set".into());
            errors.add("mail", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
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
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_redirect_path() -> String {
    "/JP_gateway/payment".to_string()
}
fn default_short_timeout_secs() -> u64 {
    30
}
fn default_long_timeout_secs() -> u64 {
    60
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_sweep_batch() -> u64 {
    50
}
fn default_retry_backoff_secs() -> u64 {
    60
}
fn default_true_bool() -> bool {
    true
}
fn default_smtp_port() -> u16 {
    587
}
fn default_from_email() -> String {
    "tickets@localhost.localdomain".to_string()
}
fn default_from_name() -> String {
    "Online Ticketing".to_string()
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    if LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("log_level must be one of trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_timezone(name: &str) -> Result<(), ValidationError> {
    if name.parse::<chrono_tz::Tz>().is_ok() {
        Ok(())
    } else {
        let mut err = ValidationError::new("timezone");
        err.message = Some("timezone must be an IANA zone such as Asia/Kuala_Lumpur".into());
        Err(err)
    }
}

/// Accepts `60` or `60s`.
fn parse_interval_secs(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    trimmed
        .strip_suffix('s')
        .unwrap_or(trimmed)
        .trim()
        .parse()
        .ok()
}

/// Initialize the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("zooticket_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. `config/default.toml`
/// 3. `config/{RUN_ENV}.toml`
/// 4. `APP__SECTION__KEY` environment variables
/// 5. The flat deployment variables (`PAYMENT_API_KEY`, `SWEEP_BATCH`, ...)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_with(|key| env::var(key).ok())
}

/// Same as [`load_config`] with the flat-variable lookup injected.
pub fn load_config_with<F>(lookup: F) -> Result<AppConfig, AppConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let run_env = lookup("RUN_ENV")
        .or_else(|| lookup("APP_ENV"))
        .unwrap_or_else(|| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let mut builder = Config::builder()
        .set_default("server.host", default_host())?
        .set_default("server.port", i64::from(DEFAULT_PORT))?
        .set_default("server.environment", DEFAULT_ENV)?
        .set_default("server.log_level", DEFAULT_LOG_LEVEL)?
        .set_default("server.log_json", false)?
        .set_default("database.database_url", "sqlite://zooticket.db?mode=rwc")?
        .set_default("database.auto_migrate", true)?
        .set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?
        .set_default("payment.gateway_url", "http://localhost:9001")?
        .set_default("zoo.base_url", "http://localhost:9002")?
        .set_default("timezone", DEFAULT_TIMEZONE)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    for (var, key) in FLAT_ENV_OVERRIDES {
        let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        builder = match key {
            "delivery.sweep_interval_secs" => {
                let secs = parse_interval_secs(&value).ok_or_else(|| {
                    ConfigError::Message(format!("{} must be a number of seconds", var))
                })?;
                builder.set_override(key, secs as i64)?
            }
            "delivery.sweep_batch" => {
                let batch: i64 = value.trim().parse().map_err(|_| {
                    ConfigError::Message(format!("{} must be a positive integer", var))
                })?;
                builder.set_override(key, batch)?
            }
            _ => builder.set_override(key, value)?,
        };
    }

    let app_config: AppConfig = builder.build()?.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
