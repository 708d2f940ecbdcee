//! Configuration management for campus-market
//!
//! Configuration is loaded from a TOML file; every section and field has a
//! default so an empty file is a valid configuration.
//!
//! # Example Configuration File
//!
//! ```toml
//! data_dir = "/var/lib/campus-market"
//!
//! [marketplace]
//! name = "Campus Market"
//! currency = "OMR"
//! platform_fee_percent = 10
//! transaction_prefix = "MYS"
//! enforce_payment_order = true
//!
//! [api]
//! bind_address = "0.0.0.0:8080"
//!
//! [database]
//! url = "sqlite:campus-market.db"
//!
//! [client]
//! base_url = "http://127.0.0.1:8080/api"
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::fee::FeePolicy;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory relative database paths resolve against
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Marketplace rules
    #[serde(default)]
    pub marketplace: MarketplaceConfig,

    /// API server configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Session configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Client core configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            marketplace: MarketplaceConfig::default(),
            api: ApiConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            client: ClientConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("campus-market"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Marketplace rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// Platform name shown in generated agreements
    #[serde(default = "default_name")]
    pub name: String,

    /// Currency every amount is denominated in
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Share of each payment kept by the platform, in percent
    #[serde(default = "default_platform_fee_percent")]
    pub platform_fee_percent: Decimal,

    /// Prefix of generated transaction ids
    #[serde(default = "default_transaction_prefix")]
    pub transaction_prefix: String,

    /// Shortest contract, in months
    #[serde(default = "default_min_duration")]
    pub min_duration_months: u32,

    /// Longest contract, in months
    #[serde(default = "default_max_duration")]
    pub max_duration_months: u32,

    /// Require each payment to match the earliest pending installment
    #[serde(default = "default_true")]
    pub enforce_payment_order: bool,

    /// Number of payments listed in an earnings summary
    #[serde(default = "default_recent_payments")]
    pub recent_payments: usize,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            currency: default_currency(),
            platform_fee_percent: default_platform_fee_percent(),
            transaction_prefix: default_transaction_prefix(),
            min_duration_months: default_min_duration(),
            max_duration_months: default_max_duration(),
            enforce_payment_order: true,
            recent_payments: default_recent_payments(),
        }
    }
}

impl MarketplaceConfig {
    /// Fee policy derived from the configured percentage
    pub fn fee_policy(&self) -> FeePolicy {
        FeePolicy::new(self.platform_fee_percent)
    }
}

fn default_name() -> String {
    "Campus Market".to_string()
}

fn default_currency() -> String {
    "OMR".to_string()
}

fn default_platform_fee_percent() -> Decimal {
    Decimal::TEN
}

fn default_transaction_prefix() -> String {
    "MYS".to_string()
}

fn default_min_duration() -> u32 {
    1
}

fn default_max_duration() -> u32 {
    24
}

fn default_recent_payments() -> usize {
    10
}

fn default_true() -> bool {
    true
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the API server to
    #[serde(default = "default_api_bind")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_api_bind(),
            enable_cors: true,
        }
    }
}

fn default_api_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL or path
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite:campus-market.db".to_string()
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of an issued token
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: i64,

    /// Minimum password length accepted at registration
    #[serde(default = "default_min_password")]
    pub min_password_length: usize,

    /// Email of the admin account created at start-up
    ///
    /// The password is read from `CAMPUS_MARKET_ADMIN_PASSWORD`.
    #[serde(default)]
    pub admin_email: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl(),
            min_password_length: default_min_password(),
            admin_email: None,
        }
    }
}

fn default_session_ttl() -> i64 {
    24 * 7
}

fn default_min_password() -> usize {
    8
}

/// Client core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend API, including the `/api` prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_client_timeout")]
    pub timeout_seconds: u64,

    /// Payment method sent with every payment
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_client_timeout(),
            payment_method: default_payment_method(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/api".to_string()
}

fn default_client_timeout() -> u64 {
    30
}

fn default_payment_method() -> String {
    "mock_card".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Resolve the database URL, making it relative to data_dir if needed
    pub fn resolve_database_url(&self) -> String {
        let url = &self.database.url;

        if url.starts_with("sqlite:/") || url == "sqlite::memory:" {
            return url.clone();
        }

        let path = url.strip_prefix("sqlite:").unwrap_or(url);

        if std::path::Path::new(path).is_absolute() || path == ":memory:" {
            return url.clone();
        }

        let db_path = self.data_dir.join(path);
        format!("sqlite:{}", db_path.display())
    }

    /// Get the API bind address
    pub fn api_bind_address(&self) -> String {
        self.api.bind_address.clone()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let market = &self.marketplace;

        if market.platform_fee_percent < Decimal::ZERO
            || market.platform_fee_percent > Decimal::ONE_HUNDRED
        {
            return Err(format!(
                "Platform fee must be between 0 and 100 percent, got {}",
                market.platform_fee_percent
            ));
        }

        if market.min_duration_months == 0 {
            return Err("Minimum contract duration must be at least one month".to_string());
        }

        if market.min_duration_months > market.max_duration_months {
            return Err("Minimum contract duration cannot exceed the maximum".to_string());
        }

        if market.currency.trim().is_empty() {
            return Err("Currency cannot be empty".to_string());
        }

        if market.transaction_prefix.is_empty()
            || !market
                .transaction_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(format!(
                "Transaction prefix must be non-empty and alphanumeric, got {:?}",
                market.transaction_prefix
            ));
        }

        if self.auth.session_ttl_hours <= 0 {
            return Err("Session lifetime must be positive".to_string());
        }

        if self.client.timeout_seconds == 0 {
            return Err("Client timeout cannot be 0".to_string());
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(format!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format, valid_formats
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.marketplace.platform_fee_percent, Decimal::TEN);
        assert!(config.marketplace.enforce_payment_order);
    }

    #[test]
    fn test_validate_config() {
        let mut config = Config::default();

        config.marketplace.platform_fee_percent = Decimal::from(150);
        assert!(config.validate().is_err());

        config.marketplace.platform_fee_percent = Decimal::TEN;
        config.marketplace.min_duration_months = 12;
        config.marketplace.max_duration_months = 6;
        assert!(config.validate().is_err());

        config.marketplace.max_duration_months = 12;
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [marketplace]
            platform_fee_percent = 12.5
            enforce_payment_order = false
            "#,
        )
        .unwrap();

        assert_eq!(config.marketplace.platform_fee_percent, Decimal::new(125, 1));
        assert!(!config.marketplace.enforce_payment_order);
        assert_eq!(config.marketplace.currency, "OMR");
        assert_eq!(config.api.bind_address, "127.0.0.1:8080");
    }

    #[test]
    fn test_resolve_database_url() {
        let mut config = Config {
            data_dir: PathBuf::from("/srv/market"),
            ..Default::default()
        };
        assert_eq!(config.resolve_database_url(), "sqlite:/srv/market/campus-market.db");

        config.database.url = "sqlite::memory:".to_string();
        assert_eq!(config.resolve_database_url(), "sqlite::memory:");
    }
}
