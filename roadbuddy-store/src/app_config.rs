use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub obligations: ObligationsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

/// Without a URL the service runs on in-memory stores.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PaymentConfig {
    pub currency: String,
    pub timeout_ms: u64,
    pub breaker_failure_threshold: usize,
    pub breaker_reset_seconds: u64,
    /// Simulated gateway declines charges above this amount.
    pub decline_over: Option<Decimal>,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            timeout_ms: 5000,
            breaker_failure_threshold: 5,
            breaker_reset_seconds: 30,
            decline_over: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 50,
            max_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ObligationsConfig {
    pub sweep_interval_seconds: u64,
}

impl Default for ObligationsConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests: i64,
    pub window_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 100,
            window_seconds: 60,
        }
    }
}

impl Config {
    /// Layered load: `config/default`, `config/{RUN_MODE}`, `config/local`,
    /// then `ROADBUDDY`-prefixed environment variables (`__` between keys).
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("ROADBUDDY").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};
    use rust_decimal_macros::dec;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse(
            r#"
            [server]
            port = 3000

            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 3600
            "#,
        );

        assert_eq!(cfg.server.port, 3000);
        assert!(cfg.database.url.is_none());
        assert!(cfg.kafka.brokers.is_none());
        assert_eq!(cfg.payment.currency, "USD");
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.rate_limit.requests, 100);
    }

    #[test]
    fn test_sections_override_defaults() {
        let cfg = parse(
            r#"
            [server]
            port = 8080

            [database]
            url = "postgres://localhost/roadbuddy"

            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 60

            [payment]
            currency = "EUR"
            decline_over = "500.00"

            [obligations]
            sweep_interval_seconds = 5
            "#,
        );

        assert_eq!(cfg.database.url.as_deref(), Some("postgres://localhost/roadbuddy"));
        assert_eq!(cfg.database.max_connections, 5);
        assert_eq!(cfg.payment.currency, "EUR");
        assert_eq!(cfg.payment.timeout_ms, 5000);
        assert_eq!(cfg.payment.decline_over, Some(dec!(500)));
        assert_eq!(cfg.obligations.sweep_interval_seconds, 5);
    }
}
