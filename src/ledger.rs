//! The Ledger Store: idempotent payment persistence and range-aggregated
//! summaries.
//!
//! `LedgerStore` is implemented twice: `PgLedgerStore` against a real pool,
//! and `InMemoryLedgerStore` for tests that don't want a running Postgres.
//! Both sides of the trait follow the same idempotent-insert contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::DatabaseSettings;
use crate::models::{PaymentRecord, ProcessorTotals};

/// Schema note (spec §9 open question #2): the `processor_type` CHECK
/// constraint on the `payments` table must include `'simulated'` alongside
/// `'default'` and `'fallback'`, since the dispatcher may persist a
/// simulated success when both processors are down.
pub const PAYMENTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS payments (
    id BIGSERIAL PRIMARY KEY,
    correlation_id UUID NOT NULL UNIQUE,
    amount NUMERIC(10, 2) NOT NULL,
    processor_type TEXT NOT NULL CHECK (processor_type IN ('default', 'fallback', 'simulated')),
    requested_at TIMESTAMPTZ NOT NULL,
    processed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    status TEXT NOT NULL DEFAULT 'processed' CHECK (status IN ('processed', 'failed', 'pending')),
    error_message TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_payments_correlation_id ON payments (correlation_id);
CREATE INDEX IF NOT EXISTS idx_payments_processor_type ON payments (processor_type);
CREATE INDEX IF NOT EXISTS idx_payments_requested_at ON payments (requested_at);
CREATE INDEX IF NOT EXISTS idx_payments_processed_at ON payments (processed_at);
"#;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts a processed payment. On a `correlation_id` conflict this is a
    /// no-op: the first writer wins and no error is returned.
    async fn put_payment(
        &self,
        correlation_id: Uuid,
        amount: Decimal,
        processor_type: &str,
        requested_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    async fn get_payment(&self, correlation_id: Uuid) -> anyhow::Result<Option<PaymentRecord>>;

    /// Aggregates `processed` payments per processor over `[from, to]`
    /// (either bound optional). Always returns both processor keys, zeroed
    /// when there is no matching data.
    async fn get_summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> anyhow::Result<(ProcessorTotals, ProcessorTotals)>;
}

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let query_timeout_ms = settings.query_timeout.as_millis();
        let pool = PgPoolOptions::new()
            .min_connections(settings.pool_min)
            .max_connections(settings.pool_max)
            .idle_timeout(settings.idle_timeout)
            .acquire_timeout(settings.connect_timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query(&format!("SET statement_timeout = {query_timeout_ms}"))
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&settings.connection_string())
            .await?;
        sqlx::query(PAYMENTS_SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn put_payment(
        &self,
        correlation_id: Uuid,
        amount: Decimal,
        processor_type: &str,
        requested_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (correlation_id, amount, processor_type, requested_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (correlation_id) DO NOTHING
            "#,
        )
        .bind(correlation_id)
        .bind(amount)
        .bind(processor_type)
        .bind(requested_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_payment(&self, correlation_id: Uuid) -> anyhow::Result<Option<PaymentRecord>> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT correlation_id, amount, processor_type, requested_at, processed_at, status
            FROM payments WHERE correlation_id = $1
            "#,
        )
        .bind(correlation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> anyhow::Result<(ProcessorTotals, ProcessorTotals)> {
        let rows: Vec<(String, i64, Decimal)> = sqlx::query_as(
            r#"
            SELECT processor_type, COUNT(*), COALESCE(SUM(amount), 0)
            FROM payments
            WHERE status = 'processed'
              AND ($1::timestamptz IS NULL OR requested_at >= $1)
              AND ($2::timestamptz IS NULL OR requested_at <= $2)
            GROUP BY processor_type
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut default = ProcessorTotals::default();
        let mut fallback = ProcessorTotals::default();
        for (processor_type, count, amount) in rows {
            match processor_type.as_str() {
                "default" => {
                    default.total_requests = count;
                    default.total_amount = amount;
                }
                "fallback" => {
                    fallback.total_requests = count;
                    fallback.total_amount = amount;
                }
                _ => {}
            }
        }

        Ok((default, fallback))
    }
}

/// In-memory double used by tests that exercise the dispatcher's control
/// flow without a running Postgres instance.
pub struct InMemoryLedgerStore {
    rows: std::sync::Mutex<Vec<PaymentRecord>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self { rows: std::sync::Mutex::new(Vec::new()) }
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn put_payment(
        &self,
        correlation_id: Uuid,
        amount: Decimal,
        processor_type: &str,
        requested_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let existing: Vec<Uuid> = rows.iter().map(|r| r.correlation_id).collect();
        if !crate::consistency::no_duplicate_correlation_id(&existing, correlation_id).passed {
            return Ok(());
        }
        rows.push(PaymentRecord {
            correlation_id,
            amount,
            processor_type: processor_type.to_string(),
            requested_at,
            processed_at: Utc::now(),
            status: "processed".to_string(),
        });
        Ok(())
    }

    async fn get_payment(&self, correlation_id: Uuid) -> anyhow::Result<Option<PaymentRecord>> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows.iter().find(|r| r.correlation_id == correlation_id).cloned())
    }

    async fn get_summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> anyhow::Result<(ProcessorTotals, ProcessorTotals)> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let mut default = ProcessorTotals::default();
        let mut fallback = ProcessorTotals::default();
        for row in rows.iter().filter(|r| r.status == "processed") {
            if let Some(from) = from {
                if row.requested_at < from {
                    continue;
                }
            }
            if let Some(to) = to {
                if row.requested_at > to {
                    continue;
                }
            }
            let totals = match row.processor_type.as_str() {
                "default" => &mut default,
                "fallback" => &mut fallback,
                _ => continue,
            };
            totals.total_requests += 1;
            totals.total_amount += row.amount;
        }
        Ok((default, fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_correlation_id_is_a_no_op() {
        let store = InMemoryLedgerStore::new();
        let id = Uuid::new_v4();
        let now = Utc::now();
        store.put_payment(id, Decimal::new(1000, 2), "default", now).await.unwrap();
        store.put_payment(id, Decimal::new(2000, 2), "fallback", now).await.unwrap();

        let row = store.get_payment(id).await.unwrap().unwrap();
        assert_eq!(row.amount, Decimal::new(1000, 2));
        assert_eq!(row.processor_type, "default");
    }

    #[tokio::test]
    async fn summary_round_trips_known_amounts() {
        let store = InMemoryLedgerStore::new();
        let now = Utc::now();
        for amount in [10, 20, 30] {
            store
                .put_payment(Uuid::new_v4(), Decimal::new(amount * 100, 2), "default", now)
                .await
                .unwrap();
        }
        store
            .put_payment(Uuid::new_v4(), Decimal::new(10000, 2), "fallback", now)
            .await
            .unwrap();

        let (default, fallback) = store.get_summary(None, None).await.unwrap();
        assert_eq!(default.total_requests, 3);
        assert_eq!(default.total_amount, Decimal::new(6000, 2));
        assert_eq!(fallback.total_requests, 1);
        assert_eq!(fallback.total_amount, Decimal::new(10000, 2));
    }
}
