//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::limits::{self, TransferLimits};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Apply pending migrations at startup
    pub auto_migrate: bool,

    /// Transfer engine tuning
    pub engine: EngineConfig,
}

/// Settings of the transfer engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Longest wait for any single row lock inside a unit of work
    pub lock_timeout: Duration,

    /// Attempts per transfer when units abort on contention
    pub max_attempts: u32,

    /// Cap, velocity and rate limits
    pub limits: TransferLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2_000),
            max_attempts: 3,
            limits: TransferLimits::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10)?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = parse_or("PORT", 3000)?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let log_json = env::var("LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let auto_migrate = parse_or("AUTO_MIGRATE", false)?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            log_json,
            auto_migrate,
            engine: EngineConfig::from_env()?,
        })
    }
}

impl EngineConfig {
    /// Load engine settings, falling back to the built-in limits
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = TransferLimits::default();

        let lock_timeout_ms: u64 = parse_or("LOCK_TIMEOUT_MS", 2_000)?;
        let max_attempts: u32 = parse_or("TRANSFER_MAX_RETRIES", 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue("TRANSFER_MAX_RETRIES"));
        }

        let limits = TransferLimits {
            per_transfer_cap_cents: parse_positive("TRANSFER_CAP_CENTS", limits::SINGLE_TRANSFER_CAP_CENTS)?,
            daily_outbound_cents: parse_positive("DAILY_OUTBOUND_LIMIT_CENTS", limits::DAILY_OUTBOUND_LIMIT_CENTS)?,
            daily_inbound_cents: parse_positive("DAILY_INBOUND_LIMIT_CENTS", limits::DAILY_INBOUND_LIMIT_CENTS)?,
            hourly_sends: parse_positive("HOURLY_SEND_LIMIT", limits::HOURLY_SEND_LIMIT)?,
            ..defaults
        };

        Ok(Self {
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            max_attempts,
            limits,
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

fn parse_positive(key: &'static str, default: i64) -> Result<i64, ConfigError> {
    let value: i64 = parse_or(key, default)?;
    if value <= 0 {
        return Err(ConfigError::InvalidValue(key));
    }
    Ok(value)
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults_match_limits() {
        let config = EngineConfig::default();
        assert_eq!(config.lock_timeout, Duration::from_secs(2));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.limits.per_transfer_cap_cents, 2_500_000);
        assert_eq!(config.limits.hourly_sends, 5);
    }

    #[test]
    fn test_parse_or_falls_back_when_unset() {
        let value: u32 = parse_or("EWALLET_TEST_SURELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
