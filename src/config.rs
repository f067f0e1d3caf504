//! Environment-driven settings for the dispatch engine.
//!
//! Every tunable has a documented default so the service runs out of the box
//! in development; production deployments override via environment variables.

use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_or(key, default_secs))
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_or(key, default_ms))
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub ssl: bool,
    pub pool_min: u32,
    pub pool_max: u32,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
}

impl DatabaseSettings {
    fn from_env() -> Self {
        Self {
            host: std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env_or("DB_PORT", 5432),
            name: std::env::var("DB_NAME").unwrap_or_else(|_| "payments".to_string()),
            user: std::env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("DB_PASSWORD").unwrap_or_default(),
            ssl: env_or("DB_SSL", false),
            pool_min: env_or("DB_POOL_MIN", 5),
            pool_max: env_or("DB_POOL_MAX", 25),
            idle_timeout: env_secs("DB_IDLE_TIMEOUT_SECS", 30),
            connect_timeout: env_secs("DB_CONNECT_TIMEOUT_SECS", 2),
            query_timeout: env_secs("DB_QUERY_TIMEOUT_SECS", 30),
        }
    }

    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user,
            self.password,
            self.host,
            self.port,
            self.name,
            if self.ssl { "require" } else { "disable" },
        )
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub ring_capacity: usize,
}

impl CircuitBreakerSettings {
    fn from_env() -> Self {
        Self {
            failure_threshold: env_or("CIRCUIT_FAILURE_THRESHOLD", 3),
            reset_timeout: env_secs("CIRCUIT_RESET_TIMEOUT_SECS", 30),
            ring_capacity: env_or("CIRCUIT_RING_CAPACITY", 100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_fraction: f64,
}

impl RetrySettings {
    fn from_env() -> Self {
        Self {
            max_retries: env_or("RETRY_MAX_RETRIES", 2),
            base_delay: env_millis("RETRY_BASE_DELAY_MS", 500),
            max_delay: env_millis("RETRY_MAX_DELAY_MS", 5000),
            multiplier: env_or("RETRY_MULTIPLIER", 2.0),
            jitter_fraction: env_or("RETRY_JITTER_FRACTION", 0.10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthPollerSettings {
    pub poll_interval: Duration,
    pub probe_timeout: Duration,
}

impl HealthPollerSettings {
    fn from_env() -> Self {
        Self {
            poll_interval: env_secs("HEALTH_POLL_INTERVAL_SECS", 5),
            probe_timeout: env_secs("HEALTH_PROBE_TIMEOUT_SECS", 3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub default_url: String,
    pub fallback_url: String,
    pub payment_timeout: Duration,
}

impl ProcessorSettings {
    fn from_env() -> Self {
        Self {
            default_url: std::env::var("DEFAULT_PROCESSOR_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            fallback_url: std::env::var("FALLBACK_PROCESSOR_URL")
                .unwrap_or_else(|_| "http://localhost:8002".to_string()),
            payment_timeout: env_secs("PROCESSOR_PAYMENT_TIMEOUT_SECS", 10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub app_env: String,
    pub log_level: String,
    pub simulate_payments: bool,
    pub p99_threshold_ms: u64,
    pub cache_ttl: Duration,
    pub redis_url: String,
    pub db: DatabaseSettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub retry: RetrySettings,
    pub health_poller: HealthPollerSettings,
    pub processor: ProcessorSettings,
    pub shutdown_graceful_timeout: Duration,
    /// Upper bound on any single inbound HTTP request, enforced by a
    /// `tower::timeout::TimeoutLayer` ahead of the router (spec §5: every
    /// call in the system carries an explicit timeout).
    pub request_timeout: Duration,
}

impl Settings {
    /// Load settings from the environment, applying `.env` in development if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            port: env_or("PORT", 3000),
            app_env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            simulate_payments: env_or("SIMULATE_PAYMENTS", false),
            p99_threshold_ms: env_or("P99_THRESHOLD", 1000),
            cache_ttl: env_secs("CACHE_TTL", 300),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            db: DatabaseSettings::from_env(),
            circuit_breaker: CircuitBreakerSettings::from_env(),
            retry: RetrySettings::from_env(),
            health_poller: HealthPollerSettings::from_env(),
            processor: ProcessorSettings::from_env(),
            shutdown_graceful_timeout: env_secs("SHUTDOWN_GRACEFUL_TIMEOUT_SECS", 30),
            request_timeout: env_secs("HTTP_REQUEST_TIMEOUT_SECS", 30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_breaker_defaults_match_spec() {
        std::env::remove_var("CIRCUIT_FAILURE_THRESHOLD");
        std::env::remove_var("CIRCUIT_RESET_TIMEOUT_SECS");
        let cfg = CircuitBreakerSettings::from_env();
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.reset_timeout, Duration::from_secs(30));
        assert_eq!(cfg.ring_capacity, 100);
    }

    #[test]
    fn retry_defaults_match_spec() {
        std::env::remove_var("RETRY_MAX_RETRIES");
        std::env::remove_var("RETRY_BASE_DELAY_MS");
        let cfg = RetrySettings::from_env();
        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.base_delay, Duration::from_millis(500));
        assert_eq!(cfg.max_delay, Duration::from_millis(5000));
    }
}
