//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use order_engine::EngineConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `DB_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `LOCK_TIMEOUT_MS`: row lock wait before a conflict (default: `2000`)
/// - `TX_MAX_ATTEMPTS`: attempts per transaction on conflict (default: `3`)
/// - `TX_RETRY_BACKOFF_MS`: base retry backoff (default: `25`)
/// - `LOW_STOCK_THRESHOLD`: default low-stock threshold (default: `10`)
/// - `NOTIFICATION_QUEUE_CAPACITY`: queued notifications (default: `1024`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub lock_timeout: Duration,
    pub tx_max_attempts: u32,
    pub tx_retry_backoff: Duration,
    pub low_stock_threshold: i64,
    pub notification_queue_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Values that fail to parse fall back to the default as well.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env_parse("LOG_FORMAT").unwrap_or(defaults.log_format),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS")
                .unwrap_or(defaults.db_max_connections),
            lock_timeout: env_parse("LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            tx_max_attempts: env_parse("TX_MAX_ATTEMPTS").unwrap_or(defaults.tx_max_attempts),
            tx_retry_backoff: env_parse("TX_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.tx_retry_backoff),
            low_stock_threshold: env_parse("LOW_STOCK_THRESHOLD")
                .unwrap_or(defaults.low_stock_threshold),
            notification_queue_capacity: env_parse("NOTIFICATION_QUEUE_CAPACITY")
                .unwrap_or(defaults.notification_queue_capacity),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Engine settings derived from this configuration.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig::default()
            .with_retry(self.tx_max_attempts, self.tx_retry_backoff)
            .with_low_stock_threshold(self.low_stock_threshold)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            db_max_connections: 10,
            lock_timeout: Duration::from_millis(2000),
            tx_max_attempts: 3,
            tx_retry_backoff: Duration::from_millis(25),
            low_stock_threshold: 10,
            notification_queue_capacity: 1024,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable configuration value");
            None
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
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.lock_timeout, Duration::from_millis(2000));
        assert_eq!(config.notification_queue_capacity, 1024);
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
    fn test_engine_config_follows_settings() {
        let config = Config {
            tx_max_attempts: 5,
            tx_retry_backoff: Duration::from_millis(10),
            low_stock_threshold: 4,
            ..Config::default()
        };
        let engine = config.engine();
        assert_eq!(engine.retry.max_attempts, 5);
        assert_eq!(engine.retry.base_delay, Duration::from_millis(10));
        assert_eq!(engine.low_stock_threshold, 4);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
