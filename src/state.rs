//! Composition root: the explicit, constructor-injected collaborator set
//! shared by every HTTP handler.
//!
//! The teacher instantiates several of its services as module-level
//! singletons; per the redesign notes this replaces that with one
//! explicit struct built once in `main.rs` and cloned (cheaply, via `Arc`)
//! into the router.

use std::sync::Arc;

use crate::audit::AuditLog;
use crate::cache::Cache;
use crate::config::Settings;
use crate::dispatcher::Dispatcher;
use crate::metrics::MetricsRecorder;
use crate::processor::CircuitBreaker;
use crate::summary::SummaryAggregator;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub summary: Arc<SummaryAggregator>,
    pub metrics: Arc<MetricsRecorder>,
    pub audit: Arc<AuditLog>,
    pub cache: Arc<Cache>,
    pub default_breaker: Arc<CircuitBreaker>,
    pub fallback_breaker: Arc<CircuitBreaker>,
    pub settings: Arc<Settings>,
    /// Kept alongside the `LedgerStore` trait object solely to expose pool
    /// occupancy (`size`/`num_idle`) to `/health/stats` and
    /// `/health/performance`; all reads/writes still go through `dispatcher`
    /// and `summary`'s `Arc<dyn LedgerStore>`.
    pub pg_pool: sqlx::PgPool,
}
