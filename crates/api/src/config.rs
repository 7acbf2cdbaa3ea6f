//! Application configuration loaded from environment variables.

use thiserror::Error;

/// Errors raised while reading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Server configuration.
///
/// Reads from environment variables (a `.env` file is loaded first when present):
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `5000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `DATABASE_URL`: Postgres connection string; the in-memory store is used without it
/// - `JWT_ACCESS_TOKEN`: HS256 secret access tokens are signed with (required)
/// - `XENDIT_SECRET_KEY`: gateway API key; the in-memory gateway is used without it
/// - `XENDIT_CALLBACK_TOKEN`: expected `x-callback-token` of webhooks (required)
/// - `XENDIT_BASE_URL`: gateway base URL (default `https://api.xendit.co`)
/// - `PAYMENT_SUCCESS_REDIRECT_URL` / `PAYMENT_FAILURE_REDIRECT_URL`: where
///   the hosted invoice page sends the customer
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub xendit_secret_key: Option<String>,
    pub xendit_callback_token: String,
    pub xendit_base_url: String,
    pub success_redirect_url: String,
    pub failure_redirect_url: String,
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

impl Config {
    /// Loads `.env` (if any) and reads the configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine; the variables may come from the process environment.
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let port = match optional("PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value,
            })?,
            None => defaults.port,
        };

        Ok(Self {
            host: optional("HOST").unwrap_or(defaults.host),
            port,
            log_level: optional("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: optional("DATABASE_URL"),
            jwt_secret: required("JWT_ACCESS_TOKEN")?,
            xendit_secret_key: optional("XENDIT_SECRET_KEY"),
            xendit_callback_token: required("XENDIT_CALLBACK_TOKEN")?,
            xendit_base_url: optional("XENDIT_BASE_URL").unwrap_or(defaults.xendit_base_url),
            success_redirect_url: optional("PAYMENT_SUCCESS_REDIRECT_URL")
                .unwrap_or(defaults.success_redirect_url),
            failure_redirect_url: optional("PAYMENT_FAILURE_REDIRECT_URL")
                .unwrap_or(defaults.failure_redirect_url),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            log_level: "info".to_string(),
            database_url: None,
            jwt_secret: String::new(),
            xendit_secret_key: None,
            xendit_callback_token: String::new(),
            xendit_base_url: payments::xendit::DEFAULT_BASE_URL.to_string(),
            success_redirect_url: "http://localhost:3000/payment/success".to_string(),
            failure_redirect_url: "http://localhost:3000/payment/failed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.xendit_base_url, "https://api.xendit.co");
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_missing_variable_message() {
        let err = ConfigError::Missing("JWT_ACCESS_TOKEN");
        assert_eq!(
            err.to_string(),
            "missing required environment variable JWT_ACCESS_TOKEN"
        );
    }
}
