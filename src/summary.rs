//! Summary Aggregator: serves `(from, to)` summary queries through the
//! cache, falling back to the ledger store on a miss.
//!
//! Grounded on `cache_invalidation`'s key-pattern conventions and
//! `database.rs`'s aggregate-query call-site style.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{keys, Cache};
use crate::consistency;
use crate::error::{AppError, Result};
use crate::ledger::LedgerStore;
use crate::models::PaymentSummary;

pub struct SummaryAggregator {
    ledger: Arc<dyn LedgerStore>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl SummaryAggregator {
    pub fn new(ledger: Arc<dyn LedgerStore>, cache: Arc<Cache>, cache_ttl: Duration) -> Self {
        Self { ledger, cache, cache_ttl }
    }

    pub async fn summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<PaymentSummary> {
        if let Some(failure) = consistency::date_range(from, to).detail {
            return Err(AppError::Validation(failure));
        }

        let cache_key = keys::summary(from, to);

        if let Some(cached) = self.cache.get::<PaymentSummary>(&cache_key).await {
            if self.is_consistent(&cached) {
                return Ok(cached);
            }
            tracing::warn!("cached summary failed a consistency check, recomputing from store");
        }

        let (default, fallback) = self
            .ledger
            .get_summary(from, to)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;
        let summary = PaymentSummary { default, fallback };

        if !self.is_consistent(&summary) {
            tracing::warn!("store-computed summary failed a consistency check");
        }

        self.cache.set(&cache_key, &summary, self.cache_ttl).await;
        Ok(summary)
    }

    fn is_consistent(&self, summary: &PaymentSummary) -> bool {
        consistency::summary_structure(true, true).passed
            && consistency::summary_amounts(summary.default.total_amount, summary.fallback.total_amount).passed
            && consistency::summary_counts(summary.default.total_requests, summary.fallback.total_requests).passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedgerStore;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[tokio::test]
    async fn serves_from_store_on_cache_miss_and_caches_result() {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        ledger.put_payment(Uuid::new_v4(), Decimal::new(1000, 2), "default", Utc::now()).await.unwrap();

        let cache = Arc::new(Cache::connect("redis://127.0.0.1:0").await);
        let aggregator = SummaryAggregator::new(ledger, Arc::clone(&cache), Duration::from_secs(60));

        let summary = aggregator.summary(None, None).await.unwrap();
        assert_eq!(summary.default.total_requests, 1);

        let cached: Option<PaymentSummary> = cache.get(&keys::summary(None, None)).await;
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn rejects_inverted_range() {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let cache = Arc::new(Cache::connect("redis://127.0.0.1:0").await);
        let aggregator = SummaryAggregator::new(ledger, cache, Duration::from_secs(60));

        let from = Utc::now();
        let to = from - chrono::Duration::seconds(5);
        let result = aggregator.summary(Some(from), Some(to)).await;
        assert!(matches!(result, Err(crate::error::AppError::Validation(_))));
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_persistence_error() {
        struct FailingLedger;

        #[async_trait::async_trait]
        impl LedgerStore for FailingLedger {
            async fn put_payment(
                &self,
                _correlation_id: Uuid,
                _amount: Decimal,
                _processor_type: &str,
                _requested_at: DateTime<Utc>,
            ) -> anyhow::Result<()> {
                unimplemented!()
            }

            async fn get_payment(&self, _correlation_id: Uuid) -> anyhow::Result<Option<crate::models::PaymentRecord>> {
                unimplemented!()
            }

            async fn get_summary(
                &self,
                _from: Option<DateTime<Utc>>,
                _to: Option<DateTime<Utc>>,
            ) -> anyhow::Result<(crate::models::ProcessorTotals, crate::models::ProcessorTotals)> {
                anyhow::bail!("connection reset by peer")
            }
        }

        let cache = Arc::new(Cache::connect("redis://127.0.0.1:0").await);
        let aggregator = SummaryAggregator::new(Arc::new(FailingLedger), cache, Duration::from_secs(60));

        let result = aggregator.summary(None, None).await;
        assert!(matches!(result, Err(crate::error::AppError::Persistence(_))));
    }
}
