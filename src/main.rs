use std::sync::Arc;
use std::time::Instant;

use axum::{error_handling::HandleErrorLayer, Router};
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use payment_dispatch_gateway::audit::AuditLog;
use payment_dispatch_gateway::cache::Cache;
use payment_dispatch_gateway::config::Settings;
use payment_dispatch_gateway::dispatcher::{Dispatcher, ProcessorHandle};
use payment_dispatch_gateway::ledger::{LedgerStore, PgLedgerStore};
use payment_dispatch_gateway::metrics::MetricsRecorder;
use payment_dispatch_gateway::models::ProcessorName;
use payment_dispatch_gateway::processor::{CircuitBreaker, HealthPoller, ProcessorClient};
use payment_dispatch_gateway::shutdown::{
    self, ShutdownConfig, ShutdownCoordinator,
};
use payment_dispatch_gateway::state::AppState;
use payment_dispatch_gateway::summary::SummaryAggregator;

/// Returns the rolling-file guard so the caller can keep it alive for the
/// lifetime of the process (dropping it stops the background flush thread).
fn init_tracing(settings: &Settings) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));

    let registry = tracing_subscriber::registry().with(filter);

    if settings.app_env == "production" {
        let file_appender = tracing_appender::rolling::daily("logs", "payment-dispatch-gateway.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
            .init();
        Some(guard)
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Arc::new(Settings::from_env());
    let _tracing_guard = init_tracing(&settings);

    tracing::info!(port = settings.port, env = settings.app_env, "starting payment-dispatch-gateway");

    let pg_store = PgLedgerStore::connect(&settings.db).await?;
    let pg_pool = pg_store.pool().clone();
    let ledger: Arc<dyn LedgerStore> = Arc::new(pg_store);
    let cache = Arc::new(Cache::connect(&settings.redis_url).await);
    let metrics = Arc::new(MetricsRecorder::new());
    let audit = Arc::new(AuditLog::new());

    let default_client = Arc::new(ProcessorClient::new(
        "default",
        settings.processor.default_url.clone(),
        settings.processor.payment_timeout,
        settings.health_poller.probe_timeout,
    ));
    let fallback_client = Arc::new(ProcessorClient::new(
        "fallback",
        settings.processor.fallback_url.clone(),
        settings.processor.payment_timeout,
        settings.health_poller.probe_timeout,
    ));

    let default_breaker = Arc::new(CircuitBreaker::new("default", &settings.circuit_breaker));
    let fallback_breaker = Arc::new(CircuitBreaker::new("fallback", &settings.circuit_breaker));

    let dispatcher = Arc::new(Dispatcher::new(
        ProcessorHandle { name: ProcessorName::Default, client: Arc::clone(&default_client), breaker: Arc::clone(&default_breaker) },
        ProcessorHandle { name: ProcessorName::Fallback, client: Arc::clone(&fallback_client), breaker: Arc::clone(&fallback_breaker) },
        &settings,
        Arc::clone(&ledger),
        Arc::clone(&cache),
        Arc::clone(&metrics),
        Arc::clone(&audit),
    ));

    let summary = Arc::new(SummaryAggregator::new(Arc::clone(&ledger), Arc::clone(&cache), settings.cache_ttl));

    let shutdown_config = ShutdownConfig { graceful_timeout: settings.shutdown_graceful_timeout, ..ShutdownConfig::default() };
    let shutdown_coordinator = Arc::new(ShutdownCoordinator::new(shutdown_config));

    let poller = Arc::new(HealthPoller::new(
        Arc::clone(&default_client),
        Arc::clone(&fallback_client),
        Arc::clone(&cache),
        &settings.health_poller,
    ));
    let poller_handle = tokio::spawn(poller.run(shutdown_coordinator.subscribe()));

    let state = AppState {
        dispatcher,
        summary,
        metrics,
        audit,
        cache: Arc::clone(&cache),
        default_breaker,
        fallback_breaker,
        settings: Arc::clone(&settings),
        pg_pool: pg_pool.clone(),
    };

    let app = Router::new()
        .merge(payment_dispatch_gateway::api::router())
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(settings.request_timeout)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", settings.port)).await?;
    let start_time = Instant::now();

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(Arc::clone(&shutdown_coordinator)))
        .await?;

    shutdown::shutdown_background_tasks(vec![poller_handle], shutdown_coordinator.background_task_timeout()).await;
    shutdown::shutdown_database(pg_pool, shutdown_coordinator.db_close_timeout()).await;
    shutdown::flush_caches(&cache).await;
    shutdown::log_shutdown_summary(start_time);

    Ok(())
}

async fn wait_for_shutdown(coordinator: Arc<ShutdownCoordinator>) {
    shutdown::wait_for_signal().await;
    coordinator.trigger_shutdown();
}

async fn not_found() -> impl axum::response::IntoResponse {
    (
        axum::http::StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({ "error": "not found" })),
    )
}

async fn handle_timeout_error(err: tower::BoxError) -> impl axum::response::IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            axum::http::StatusCode::REQUEST_TIMEOUT,
            axum::Json(serde_json::json!({ "error": "request timed out" })),
        )
    } else {
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({ "error": format!("unhandled error: {err}") })),
        )
    }
}
