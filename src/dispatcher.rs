//! The Dispatcher: per-request control flow that tries the default
//! processor, falls back to the secondary on failure, persists the
//! outcome, and invalidates dependent caches.
//!
//! Grounded on the default→fallback control flow of the rinha-de-backend
//! `payment_processing_worker` example and the persist-then-invalidate
//! call-site convention in `database.rs` / `cache_invalidation.rs`. The
//! breaker/retry composition is `Breaker(Retry(Call))`: each processor
//! attempt runs its whole retry sequence inside a single `breaker.execute`
//! call, so the breaker only reacts to the final outcome of the sequence.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLog};
use crate::cache::{keys, Cache};
use crate::config::Settings;
use crate::consistency;
use crate::error::AppError;
use crate::ledger::LedgerStore;
use crate::metrics::MetricsRecorder;
use crate::models::{ProcessorName, SubmitPaymentResponse};
use crate::processor::{CircuitBreaker, ProcessorClient, RetryCoordinator};

pub struct ProcessorHandle {
    pub name: ProcessorName,
    pub client: Arc<ProcessorClient>,
    pub breaker: Arc<CircuitBreaker>,
}

pub struct Dispatcher {
    default: ProcessorHandle,
    fallback: ProcessorHandle,
    retry: RetryCoordinator,
    ledger: Arc<dyn LedgerStore>,
    cache: Arc<Cache>,
    metrics: Arc<MetricsRecorder>,
    audit: Arc<AuditLog>,
    simulate_payments: bool,
}

impl Dispatcher {
    pub fn new(
        default: ProcessorHandle,
        fallback: ProcessorHandle,
        settings: &Settings,
        ledger: Arc<dyn LedgerStore>,
        cache: Arc<Cache>,
        metrics: Arc<MetricsRecorder>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            default,
            fallback,
            retry: RetryCoordinator::new(&settings.retry),
            ledger,
            cache,
            metrics,
            audit,
            simulate_payments: settings.simulate_payments,
        }
    }

    pub async fn submit(&self, correlation_id: Uuid, amount: Decimal) -> Result<SubmitPaymentResponse, AppError> {
        if let Some(failure) = consistency::validate_submission(&correlation_id.to_string(), amount) {
            return Err(AppError::Validation(failure.detail.unwrap_or_default()));
        }

        let requested_at = Utc::now();

        match self.attempt(&self.default, correlation_id, amount, requested_at).await {
            Ok(()) => return self.finish(correlation_id, amount, requested_at, ProcessorName::Default).await,
            Err(err) => {
                tracing::info!(error_type = err.error_type(), "default processor attempt failed, trying fallback");
            }
        }

        match self.attempt(&self.fallback, correlation_id, amount, requested_at).await {
            Ok(()) => return self.finish(correlation_id, amount, requested_at, ProcessorName::Fallback).await,
            Err(err) => {
                tracing::warn!(error_type = err.error_type(), "fallback processor attempt failed");
            }
        }

        if self.simulate_payments {
            return self.finish(correlation_id, amount, requested_at, ProcessorName::Simulated).await;
        }

        Err(AppError::Unavailable)
    }

    async fn attempt(
        &self,
        handle: &ProcessorHandle,
        correlation_id: Uuid,
        amount: Decimal,
        requested_at: chrono::DateTime<Utc>,
    ) -> Result<(), AppError> {
        let start = std::time::Instant::now();
        let client = Arc::clone(&handle.client);

        let result = handle
            .breaker
            .execute(|| self.retry.run(|| client.pay(correlation_id, amount, requested_at)))
            .await;

        let latency = start.elapsed();
        self.metrics.record(handle.name.as_str(), latency, result.is_ok());
        self.audit.record(AuditEntry {
            correlation_id,
            processor: handle.name.to_string(),
            outcome: if result.is_ok() { "success".to_string() } else { "failure".to_string() },
            error_kind: result.as_ref().err().map(|e| e.error_type().to_string()),
            latency_ms: latency.as_millis() as u64,
            recorded_at: Utc::now(),
        });

        result
    }

    async fn finish(
        &self,
        correlation_id: Uuid,
        amount: Decimal,
        requested_at: chrono::DateTime<Utc>,
        processor: ProcessorName,
    ) -> Result<SubmitPaymentResponse, AppError> {
        self.ledger
            .put_payment(correlation_id, amount, processor.as_str(), requested_at)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        // Open question #3: cache invalidation failure after a successful
        // write degrades to a warning, not an error — eventual consistency
        // within the cache TTL is acceptable.
        self.cache.del_pattern(keys::summary_pattern()).await;
        self.cache.del(&keys::correlation(&correlation_id.to_string())).await;

        Ok(SubmitPaymentResponse {
            message: "payment processed".to_string(),
            correlation_id,
            amount,
            processor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerSettings, RetrySettings};
    use crate::ledger::InMemoryLedgerStore;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_settings() -> Settings {
        Settings {
            port: 0,
            app_env: "test".to_string(),
            log_level: "info".to_string(),
            simulate_payments: false,
            p99_threshold_ms: 1000,
            cache_ttl: Duration::from_secs(300),
            redis_url: "redis://127.0.0.1:0".to_string(),
            db: crate::config::DatabaseSettings {
                host: "localhost".to_string(),
                port: 5432,
                name: "test".to_string(),
                user: "test".to_string(),
                password: String::new(),
                ssl: false,
                pool_min: 1,
                pool_max: 1,
                idle_timeout: Duration::from_secs(1),
                connect_timeout: Duration::from_secs(1),
                query_timeout: Duration::from_secs(1),
            },
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: 3,
                reset_timeout: Duration::from_millis(50),
                ring_capacity: 100,
            },
            retry: RetrySettings {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
                jitter_fraction: 0.1,
            },
            health_poller: crate::config::HealthPollerSettings {
                poll_interval: Duration::from_secs(5),
                probe_timeout: Duration::from_secs(3),
            },
            processor: crate::config::ProcessorSettings {
                default_url: String::new(),
                fallback_url: String::new(),
                payment_timeout: Duration::from_secs(5),
            },
            shutdown_graceful_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        }
    }

    async fn build_dispatcher(
        default_url: String,
        fallback_url: String,
        settings: &Settings,
    ) -> Dispatcher {
        let default_client = Arc::new(ProcessorClient::new("default", default_url, Duration::from_secs(5), Duration::from_secs(3)));
        let fallback_client = Arc::new(ProcessorClient::new("fallback", fallback_url, Duration::from_secs(5), Duration::from_secs(3)));

        let default = ProcessorHandle {
            name: ProcessorName::Default,
            client: default_client,
            breaker: Arc::new(CircuitBreaker::new("default", &settings.circuit_breaker)),
        };
        let fallback = ProcessorHandle {
            name: ProcessorName::Fallback,
            client: fallback_client,
            breaker: Arc::new(CircuitBreaker::new("fallback", &settings.circuit_breaker)),
        };

        Dispatcher::new(
            default,
            fallback,
            settings,
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(Cache::connect("redis://127.0.0.1:0").await),
            Arc::new(MetricsRecorder::new()),
            Arc::new(AuditLog::new()),
        )
    }

    #[tokio::test]
    async fn happy_path_uses_default_processor() {
        let default_server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/payments")).respond_with(ResponseTemplate::new(200)).mount(&default_server).await;

        let settings = test_settings();
        let dispatcher = build_dispatcher(default_server.uri(), "http://127.0.0.1:1".to_string(), &settings).await;

        let response = dispatcher.submit(Uuid::new_v4(), Decimal::new(10050, 2)).await.unwrap();
        assert_eq!(response.processor, ProcessorName::Default);
    }

    #[tokio::test]
    async fn falls_back_when_default_fails() {
        let default_server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/payments")).respond_with(ResponseTemplate::new(500)).mount(&default_server).await;

        let fallback_server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/payments")).respond_with(ResponseTemplate::new(200)).mount(&fallback_server).await;

        let settings = test_settings();
        let dispatcher = build_dispatcher(default_server.uri(), fallback_server.uri(), &settings).await;

        let response = dispatcher.submit(Uuid::new_v4(), Decimal::new(10050, 2)).await.unwrap();
        assert_eq!(response.processor, ProcessorName::Fallback);
    }

    #[tokio::test]
    async fn simulated_success_when_both_processors_fail() {
        let default_server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/payments")).respond_with(ResponseTemplate::new(500)).mount(&default_server).await;
        let fallback_server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/payments")).respond_with(ResponseTemplate::new(500)).mount(&fallback_server).await;

        let mut settings = test_settings();
        settings.simulate_payments = true;
        let dispatcher = build_dispatcher(default_server.uri(), fallback_server.uri(), &settings).await;

        let response = dispatcher.submit(Uuid::new_v4(), Decimal::new(10050, 2)).await.unwrap();
        assert_eq!(response.processor, ProcessorName::Simulated);
    }

    #[tokio::test]
    async fn unavailable_when_both_fail_and_no_simulation() {
        let default_server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/payments")).respond_with(ResponseTemplate::new(500)).mount(&default_server).await;
        let fallback_server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/payments")).respond_with(ResponseTemplate::new(500)).mount(&fallback_server).await;

        let settings = test_settings();
        let dispatcher = build_dispatcher(default_server.uri(), fallback_server.uri(), &settings).await;

        let result = dispatcher.submit(Uuid::new_v4(), Decimal::new(10050, 2)).await;
        assert!(matches!(result, Err(AppError::Unavailable)));
    }

    #[tokio::test]
    async fn rejects_invalid_amount_before_touching_processors() {
        let settings = test_settings();
        let dispatcher = build_dispatcher("http://127.0.0.1:1".to_string(), "http://127.0.0.1:1".to_string(), &settings).await;

        let result = dispatcher.submit(Uuid::new_v4(), Decimal::ZERO).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
