//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use projections::DaemonConfig;
use workflow::{RelayConfig, RetryPolicy};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs in memory
/// - `DAEMON_POLL_INTERVAL_MS`: aggregation daemon idle poll (default `500`)
/// - `DAEMON_BATCH_SIZE`: events folded per daemon commit (default `100`)
/// - `WORKFLOW_MAX_IN_FLIGHT`: concurrent outbox deliveries (default `5`)
/// - `WORKFLOW_MAX_ATTEMPTS`: attempts before dead-lettering (default `5`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub daemon_poll_interval: Duration,
    pub daemon_batch_size: usize,
    pub workflow_max_in_flight: usize,
    pub workflow_max_attempts: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(lookup("PORT"), defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            daemon_poll_interval: lookup("DAEMON_POLL_INTERVAL_MS")
                .and_then(|ms| ms.trim().parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.daemon_poll_interval),
            daemon_batch_size: parse_or(lookup("DAEMON_BATCH_SIZE"), defaults.daemon_batch_size),
            workflow_max_in_flight: parse_or(
                lookup("WORKFLOW_MAX_IN_FLIGHT"),
                defaults.workflow_max_in_flight,
            ),
            workflow_max_attempts: parse_or(
                lookup("WORKFLOW_MAX_ATTEMPTS"),
                defaults.workflow_max_attempts,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn daemon_config(&self) -> DaemonConfig {
        DaemonConfig {
            poll_interval: self.daemon_poll_interval,
            batch_size: self.daemon_batch_size.max(1),
            ..DaemonConfig::default()
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            max_in_flight: self.workflow_max_in_flight.max(1),
            ..RelayConfig::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.workflow_max_attempts.max(1),
            ..RetryPolicy::default()
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            daemon_poll_interval: Duration::from_millis(500),
            daemon_batch_size: 100,
            workflow_max_in_flight: 5,
            workflow_max_attempts: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.workflow_max_in_flight, 5);
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
    fn test_env_overrides() {
        let config = config_from(&[
            ("PORT", "8081"),
            ("DATABASE_URL", "postgres://localhost/intake"),
            ("DAEMON_POLL_INTERVAL_MS", "250"),
            ("DAEMON_BATCH_SIZE", "20"),
            ("WORKFLOW_MAX_IN_FLIGHT", "2"),
            ("WORKFLOW_MAX_ATTEMPTS", "9"),
        ]);
        assert_eq!(config.port, 8081);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/intake"));
        assert_eq!(config.daemon_config().poll_interval, Duration::from_millis(250));
        assert_eq!(config.daemon_config().batch_size, 20);
        assert_eq!(config.relay_config().max_in_flight, 2);
        assert_eq!(config.retry_policy().max_attempts, 9);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("DATABASE_URL", "  "),
            ("WORKFLOW_MAX_IN_FLIGHT", "-3"),
        ]);
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.workflow_max_in_flight, 5);
    }
}
