//! `/health/*` — liveness, processor health, stats, performance, audit, and
//! administrative resets.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::processor::health_poller::HealthPoller;
use crate::state::AppState;

async fn liveness() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "payment-dispatch-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn payment_processors(State(state): State<AppState>) -> impl IntoResponse {
    let default = HealthPoller::snapshot(&state.cache, "default").await;
    let fallback = HealthPoller::snapshot(&state.cache, "fallback").await;

    if default.is_none() && fallback.is_none() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "no health data available"})))
            .into_response();
    }

    let retry = &state.settings.retry;
    let body = json!({
        "processors": { "default": default, "fallback": fallback },
        "circuitBreakers": {
            "default": state.default_breaker.stats(),
            "fallback": state.fallback_breaker.stats(),
        },
        "retry": {
            "maxRetries": retry.max_retries,
            "baseDelayMs": retry.base_delay.as_millis(),
            "maxDelayMs": retry.max_delay.as_millis(),
            "multiplier": retry.multiplier,
            "jitterFraction": retry.jitter_fraction,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// Pool occupancy exposed alongside both `/health/stats` and
/// `/health/performance` so contention (spec §5) is visible from either.
fn db_pool_snapshot(state: &AppState) -> serde_json::Value {
    json!({
        "size": state.pg_pool.size(),
        "numIdle": state.pg_pool.num_idle(),
    })
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "default": state.default_breaker.stats().total_requests,
        "fallback": state.fallback_breaker.stats().total_requests,
        "dbPool": db_pool_snapshot(&state),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn performance(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot(state.settings.p99_threshold_ms);
    Json(json!({
        "performance": snapshot,
        "dbPool": db_pool_snapshot(&state),
    }))
}

async fn audit_log(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.audit.recent(100))
}

async fn audit_by_correlation(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    Json(state.audit.for_correlation_id(id))
}

async fn reset_circuit_breakers(State(state): State<AppState>) -> impl IntoResponse {
    state.default_breaker.reset();
    state.fallback_breaker.reset();
    StatusCode::OK
}

async fn clear_audit_logs(State(state): State<AppState>) -> impl IntoResponse {
    state.audit.clear();
    StatusCode::OK
}

async fn clear_health_cache(State(state): State<AppState>) -> impl IntoResponse {
    state.cache.del_pattern("health:*").await;
    StatusCode::OK
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(liveness))
        .route("/payment-processors", get(payment_processors))
        .route("/stats", get(stats))
        .route("/performance", get(performance))
        .route("/audit", get(audit_log))
        .route("/audit/:correlation_id", get(audit_by_correlation))
        .route("/reset-circuit-breakers", post(reset_circuit_breakers))
        .route("/clear-health-cache", post(clear_health_cache))
        .route("/clear-audit-logs", post(clear_audit_logs))
}
