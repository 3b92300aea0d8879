use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use validator::Validate;

use crate::errors::ServiceError;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_MIN_CONNECTIONS: u32 = 1;

/// Application configuration for the ERP core library.
///
/// Loaded from layered files under `config/` plus `APP__`-prefixed
/// environment variables; the embedding application hands the relevant
/// pieces to `db` and to the service constructors.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL (Postgres in production, SQLite in tests).
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Maximum number of pooled connections.
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum number of pooled connections.
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Whether `out`/`production_out` movements may drive stock negative
    /// (back-order deployments). Off by default: oversells are rejected
    /// with `InsufficientStock`.
    #[serde(default)]
    pub allow_negative_stock: bool,

    /// Whether to run database migrations on startup.
    #[serde(default)]
    pub auto_migrate: bool,

    /// Application environment name (development, test, production).
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level for the crate's tracing output.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON (structured logging for aggregation).
    #[serde(default)]
    pub log_json: bool,
}

fn default_db_max_connections() -> u32 {
    DEFAULT_DB_MAX_CONNECTIONS
}

fn default_db_min_connections() -> u32 {
    DEFAULT_DB_MIN_CONNECTIONS
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl AppConfig {
    /// Minimal configuration around a database URL, mostly used by tests
    /// and small tools.
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            allow_negative_stock: false,
            auto_migrate: false,
            environment: "test".to_string(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Loads configuration from `config/default`, `config/{environment}` and
/// `APP__`-prefixed environment variables, later sources overriding earlier
/// ones (`APP__DATABASE_URL`, `APP__ALLOW_NEGATIVE_STOCK`, ...).
pub fn load_config() -> Result<AppConfig, ServiceError> {
    let environment = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()
        .map_err(|e| ServiceError::ConfigError(e.to_string()))?;

    let app_config: AppConfig = cfg
        .try_deserialize()
        .map_err(|e| ServiceError::ConfigError(e.to_string()))?;

    app_config
        .validate()
        .map_err(|e| ServiceError::ConfigError(e.to_string()))?;

    Ok(app_config)
}

/// Initializes the global tracing subscriber. `RUST_LOG` wins over the
/// configured level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("mrp_core={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_database_defaults_to_strict_stock_policy() {
        let cfg = AppConfig::for_database("sqlite::memory:");
        assert!(!cfg.allow_negative_stock);
        assert_eq!(cfg.db_min_connections, 1);
        assert_eq!(cfg.db_max_connections, 10);
    }

    #[test]
    fn validation_rejects_empty_database_url() {
        let cfg = AppConfig::for_database("");
        assert!(cfg.validate().is_err());
    }
}
