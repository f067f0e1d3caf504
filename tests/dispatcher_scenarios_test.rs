use chrono::Utc;
use payment_dispatch_gateway::audit::AuditLog;
use payment_dispatch_gateway::cache::Cache;
use payment_dispatch_gateway::config::{
    CircuitBreakerSettings, DatabaseSettings, HealthPollerSettings, ProcessorSettings,
    RetrySettings, Settings,
};
use payment_dispatch_gateway::dispatcher::{Dispatcher, ProcessorHandle};
use payment_dispatch_gateway::ledger::{InMemoryLedgerStore, LedgerStore};
use payment_dispatch_gateway::metrics::MetricsRecorder;
use payment_dispatch_gateway::models::ProcessorName;
use payment_dispatch_gateway::processor::{CircuitBreaker, ProcessorClient};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings() -> Settings {
    Settings {
        port: 0,
        app_env: "test".to_string(),
        log_level: "info".to_string(),
        simulate_payments: false,
        p99_threshold_ms: 1000,
        cache_ttl: Duration::from_secs(300),
        redis_url: "redis://127.0.0.1:0".to_string(),
        db: DatabaseSettings {
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
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            ring_capacity: 100,
        },
        retry: RetrySettings {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter_fraction: 0.1,
        },
        health_poller: HealthPollerSettings {
            poll_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(3),
        },
        processor: ProcessorSettings {
            default_url: String::new(),
            fallback_url: String::new(),
            payment_timeout: Duration::from_secs(5),
        },
        shutdown_graceful_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(5),
    }
}

async fn dispatcher_with(
    default_url: String,
    fallback_url: String,
    cfg: &Settings,
    ledger: Arc<dyn LedgerStore>,
) -> (Dispatcher, Arc<CircuitBreaker>) {
    let default_client = Arc::new(ProcessorClient::new("default", default_url, Duration::from_secs(5), Duration::from_secs(3)));
    let fallback_client = Arc::new(ProcessorClient::new("fallback", fallback_url, Duration::from_secs(5), Duration::from_secs(3)));
    let default_breaker = Arc::new(CircuitBreaker::new("default", &cfg.circuit_breaker));
    let fallback_breaker = Arc::new(CircuitBreaker::new("fallback", &cfg.circuit_breaker));

    let dispatcher = Dispatcher::new(
        ProcessorHandle { name: ProcessorName::Default, client: default_client, breaker: Arc::clone(&default_breaker) },
        ProcessorHandle { name: ProcessorName::Fallback, client: fallback_client, breaker: Arc::clone(&fallback_breaker) },
        cfg,
        ledger,
        Arc::new(Cache::connect("redis://127.0.0.1:0").await),
        Arc::new(MetricsRecorder::new()),
        Arc::new(AuditLog::new()),
    );

    (dispatcher, default_breaker)
}

#[tokio::test]
async fn breaker_rejection_bypasses_retry_and_goes_straight_to_fallback() {
    let default_server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/payments")).respond_with(ResponseTemplate::new(500)).mount(&default_server).await;
    let fallback_server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/payments")).respond_with(ResponseTemplate::new(200)).mount(&fallback_server).await;

    let cfg = settings();
    let ledger: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
    let (dispatcher, default_breaker) = dispatcher_with(default_server.uri(), fallback_server.uri(), &cfg, Arc::clone(&ledger)).await;

    // Trip the default breaker open first.
    for _ in 0..2 {
        let _ = dispatcher.submit(Uuid::new_v4(), Decimal::new(1000, 2)).await;
    }
    assert_eq!(default_breaker.stats().state, "open");

    let requests_before = default_server.received_requests().await.unwrap().len();
    let response = dispatcher.submit(Uuid::new_v4(), Decimal::new(1000, 2)).await.unwrap();
    let requests_after = default_server.received_requests().await.unwrap().len();

    assert_eq!(response.processor, ProcessorName::Fallback);
    // The breaker rejected before any network call was made.
    assert_eq!(requests_before, requests_after);
}

#[tokio::test]
async fn duplicate_submit_produces_exactly_one_ledger_row() {
    let default_server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/payments")).respond_with(ResponseTemplate::new(200)).mount(&default_server).await;

    let cfg = settings();
    let ledger = Arc::new(InMemoryLedgerStore::new());
    let ledger_dyn: Arc<dyn LedgerStore> = ledger.clone();
    let (dispatcher, _) = dispatcher_with(default_server.uri(), "http://127.0.0.1:1".to_string(), &cfg, ledger_dyn).await;

    let id = Uuid::new_v4();
    let (first, second) = tokio::join!(
        dispatcher.submit(id, Decimal::new(1000, 2)),
        dispatcher.submit(id, Decimal::new(1000, 2)),
    );
    assert!(first.is_ok());
    assert!(second.is_ok());

    let (default_totals, _) = ledger.get_summary(None, None).await.unwrap();
    assert_eq!(default_totals.total_requests, 1);
}

#[tokio::test]
async fn summary_reflects_requests_across_both_processors() {
    let ledger = Arc::new(InMemoryLedgerStore::new());
    let now = Utc::now();
    for amount in [10, 20, 30] {
        ledger.put_payment(Uuid::new_v4(), Decimal::new(amount * 100, 2), "default", now).await.unwrap();
    }
    ledger.put_payment(Uuid::new_v4(), Decimal::new(10000, 2), "fallback", now).await.unwrap();

    let (default, fallback) = ledger.get_summary(None, None).await.unwrap();
    assert_eq!(default.total_requests, 3);
    assert_eq!(default.total_amount, Decimal::new(6000, 2));
    assert_eq!(fallback.total_requests, 1);
    assert_eq!(fallback.total_amount, Decimal::new(10000, 2));
}
