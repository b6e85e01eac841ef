//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub federation: FederationConfig,
    pub mail: MailConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "events.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://events.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Federation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Per-request timeout for remote fetches and inbox deliveries, in seconds
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_seconds: u64,
    /// Maximum concurrent inbox deliveries during a broadcast
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,
    /// RSA key size in bits for newly created event actors
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
}

fn default_delivery_timeout() -> u64 {
    10
}

fn default_max_concurrent_deliveries() -> usize {
    10
}

fn default_key_bits() -> usize {
    4096
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_seconds: default_delivery_timeout(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
            key_bits: default_key_bits(),
        }
    }
}

/// SMTP configuration for host notifications
///
/// When disabled, notifications are logged instead of sent.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub enabled: bool,
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    /// From address, e.g. "GatherPub <noreply@events.example.com>"
    pub from_address: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from_address: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (GATHERPUB_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("federation.delivery_timeout_seconds", 10)?
            .set_default("federation.max_concurrent_deliveries", 10)?
            .set_default("federation.key_bits", 4096)?
            .set_default("mail.enabled", false)?
            .set_default("mail.smtp_port", 587)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (GATHERPUB_*)
            .add_source(
                Environment::with_prefix("GATHERPUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if !matches!(self.server.protocol.as_str(), "http" | "https") {
            return Err(crate::error::AppError::Config(format!(
                "server.protocol must be http or https, got {}",
                self.server.protocol
            )));
        }

        if self.federation.delivery_timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "federation.delivery_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.federation.max_concurrent_deliveries == 0 {
            return Err(crate::error::AppError::Config(
                "federation.max_concurrent_deliveries must be greater than 0".to_string(),
            ));
        }

        if self.mail.enabled {
            if self.mail.smtp_host.as_deref().unwrap_or("").is_empty() {
                return Err(crate::error::AppError::Config(
                    "mail.smtp_host is required when mail.enabled=true".to_string(),
                ));
            }
            if self.mail.from_address.as_deref().unwrap_or("").is_empty() {
                return Err(crate::error::AppError::Config(
                    "mail.from_address is required when mail.enabled=true".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/gatherpub-test.db"),
            },
            federation: FederationConfig::default(),
            mail: MailConfig {
                enabled: false,
                smtp_host: None,
                smtp_port: 587,
                smtp_username: None,
                smtp_password: None,
                from_address: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        let config = valid_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_delivery_timeout() {
        let mut config = valid_config();
        config.federation.delivery_timeout_seconds = 0;

        let error = config
            .validate()
            .expect_err("zero delivery timeout must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("delivery_timeout_seconds")
        ));
    }

    #[test]
    fn validate_rejects_enabled_mail_without_smtp_host() {
        let mut config = valid_config();
        config.mail.enabled = true;
        config.mail.from_address = Some("noreply@localhost".to_string());

        let error = config
            .validate()
            .expect_err("enabled mail without smtp host must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("mail.smtp_host")
        ));
    }

    #[test]
    fn validate_rejects_unknown_protocol() {
        let mut config = valid_config();
        config.server.protocol = "gopher".to_string();

        assert!(config.validate().is_err());
    }
}
