//! Background loop that refreshes the cached health snapshot of each
//! processor at a bounded minimum interval.
//!
//! Shaped after `jobs::asset_revalidation::AssetRevalidationJob::start`'s
//! interval-ticker loop, probing both processors concurrently each tick so
//! one slow processor never delays the other's refresh — mirroring the
//! health-gating read path in the rinha-de-backend worker example.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::cache::{keys, Cache};
use crate::config::HealthPollerSettings;
use crate::models::HealthSnapshot;
use crate::processor::client::ProcessorClient;

pub struct HealthPoller {
    default_client: Arc<ProcessorClient>,
    fallback_client: Arc<ProcessorClient>,
    cache: Arc<Cache>,
    poll_interval: Duration,
}

impl HealthPoller {
    pub fn new(
        default_client: Arc<ProcessorClient>,
        fallback_client: Arc<ProcessorClient>,
        cache: Arc<Cache>,
        settings: &HealthPollerSettings,
    ) -> Self {
        Self { default_client, fallback_client, cache, poll_interval: settings.poll_interval }
    }

    /// Runs until the shutdown signal resolves. Intended to be `tokio::spawn`ed
    /// once per replica; never blocks the dispatch path.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut ticker = interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("health poller stopping");
                    break;
                }
            }
        }
    }

    async fn poll_once(&self) {
        let (default_snapshot, fallback_snapshot) =
            tokio::join!(self.default_client.health(), self.fallback_client.health());

        self.publish("default", &default_snapshot).await;
        self.publish("fallback", &fallback_snapshot).await;
    }

    /// Number of historical probe latencies kept per processor (spec §4.7).
    const RESPONSE_TIME_HISTORY: usize = 50;
    /// TTL applied to every `health:*` cache entry (spec §4.7: 1 hour).
    const ENTRY_TTL: Duration = Duration::from_secs(3600);

    async fn publish(&self, processor: &str, snapshot: &HealthSnapshot) {
        let cache_hash = keys::health_cache_hash();
        if let Ok(raw) = serde_json::to_string(snapshot) {
            self.cache.hset(cache_hash, processor, &raw).await;
            self.cache.expire(cache_hash, Self::ENTRY_TTL).await;
        }

        let last_check_hash = keys::health_last_check_hash();
        self.cache.hset(last_check_hash, processor, &snapshot.last_checked_at.timestamp_millis().to_string()).await;
        self.cache.expire(last_check_hash, Self::ENTRY_TTL).await;

        let response_times_key = keys::health_response_times(processor);
        self.cache
            .lpush_capped(&response_times_key, &snapshot.response_time_ms.to_string(), Self::RESPONSE_TIME_HISTORY)
            .await;
        self.cache.expire(&response_times_key, Self::ENTRY_TTL).await;

        if snapshot.failing {
            tracing::warn!(processor, error = ?snapshot.error, "processor health probe reports failing");
        }
    }

    pub async fn snapshot(cache: &Cache, processor: &str) -> Option<HealthSnapshot> {
        let raw = cache.hget(keys::health_cache_hash(), processor).await?;
        serde_json::from_str(&raw).ok()
    }

    /// Recent probe latencies for a processor, most recent first, as
    /// published into `health:response_times:{processor}`.
    pub async fn response_time_history(cache: &Cache, processor: &str) -> Vec<i64> {
        cache
            .lrange(&keys::health_response_times(processor), 0, -1)
            .await
            .into_iter()
            .filter_map(|v| v.parse().ok())
            .collect()
    }
}
