//! HTTP client for a single payment processor.
//!
//! Grounded on `services::price_feed::CoinGeckoProvider` (reqwest client
//! construction, typed error mapping) and `rpc::stellar::StellarRpcClient`
//! (per-client builder with a fixed timeout).

use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{classify_processor_status, classify_transport_error, AppError};
use crate::models::{HealthSnapshot, ProcessorHealthResponse, ProcessorPaymentRequest};

pub struct ProcessorClient {
    name: String,
    base_url: String,
    client: Client,
    health_timeout: Duration,
}

impl ProcessorClient {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, payment_timeout: Duration, health_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(payment_timeout)
            .user_agent(concat!("payment-dispatch-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { name: name.into(), base_url: base_url.into(), client, health_timeout }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submits a payment. `requested_at` is always sent in UTC ISO-8601,
    /// per the open question resolved in `DESIGN.md`.
    pub async fn pay(&self, correlation_id: Uuid, amount: rust_decimal::Decimal, requested_at: DateTime<Utc>) -> Result<(), AppError> {
        let payload = ProcessorPaymentRequest { correlation_id, amount, requested_at };
        let url = format!("{}/payments", self.base_url);

        let response = self.client.post(&url).json(&payload).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Transient(format!("{} payment request timed out", self.name))
            } else {
                classify_transport_error(&e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_processor_status(status.as_u16(), body))
    }

    /// Probes processor health. Never returns an error: a failed probe is
    /// synthesized into a `failing` snapshot so the poller can keep running.
    pub async fn health(&self) -> HealthSnapshot {
        let url = format!("{}/payments/service-health", self.base_url);
        let start = Instant::now();

        let outcome = tokio::time::timeout(self.health_timeout, self.client.get(&url).send()).await;

        match outcome {
            Err(_) => HealthSnapshot::error_sentinel(format!("{} health probe timed out", self.name)),
            Ok(Err(e)) => HealthSnapshot::error_sentinel(e.to_string()),
            Ok(Ok(response)) => {
                let status = response.status();
                let response_time_ms = start.elapsed().as_millis() as i64;
                if !status.is_success() {
                    let mut snapshot = HealthSnapshot::error_sentinel(format!("{} returned {status}", self.name));
                    snapshot.status_code = Some(status.as_u16());
                    return snapshot;
                }
                match response.json::<ProcessorHealthResponse>().await {
                    Ok(parsed) if parsed.failing => {
                        let mut snapshot = HealthSnapshot::error_sentinel(format!("{} reports failing", self.name));
                        snapshot.min_response_time_ms = parsed.min_response_time;
                        snapshot.response_time_ms = response_time_ms;
                        snapshot.status_code = Some(status.as_u16());
                        snapshot
                    }
                    Ok(parsed) => {
                        HealthSnapshot::healthy(response_time_ms, parsed.min_response_time, status.as_u16())
                    }
                    Err(e) => HealthSnapshot::error_sentinel(e.to_string()),
                }
            }
        }
    }
}
