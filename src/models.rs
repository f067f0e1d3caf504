//! Wire and row types shared across the ledger, cache, processor client, and
//! HTTP surface.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorName {
    Default,
    Fallback,
    Simulated,
}

impl ProcessorName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Fallback => "fallback",
            Self::Simulated => "simulated",
        }
    }
}

impl std::fmt::Display for ProcessorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Processed,
    Failed,
    Pending,
}

/// A payment row as persisted in the ledger.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentRecord {
    pub correlation_id: Uuid,
    pub amount: Decimal,
    pub processor_type: String,
    pub requested_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub status: String,
}

/// Inbound request body for `POST /payments`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitPaymentRequest {
    #[serde(rename = "correlationId")]
    pub correlation_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitPaymentResponse {
    pub message: String,
    #[serde(rename = "correlationId")]
    pub correlation_id: Uuid,
    pub amount: Decimal,
    pub processor: ProcessorName,
}

/// Outbound payload sent to a processor's `POST /payments`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorPaymentRequest {
    #[serde(rename = "correlationId")]
    pub correlation_id: Uuid,
    pub amount: Decimal,
    #[serde(rename = "requestedAt")]
    pub requested_at: DateTime<Utc>,
}

/// Health probe response from a processor's `GET /payments/service-health`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorHealthResponse {
    pub failing: bool,
    #[serde(rename = "minResponseTime")]
    pub min_response_time: i64,
}

/// Cached/derived snapshot of a processor's health, published by the poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub failing: bool,
    #[serde(rename = "isHealthy")]
    pub is_healthy: bool,
    pub min_response_time_ms: i64,
    pub response_time_ms: i64,
    pub last_checked_at: DateTime<Utc>,
    pub error: Option<String>,
    pub status_code: Option<u16>,
}

impl HealthSnapshot {
    pub fn healthy(response_time_ms: i64, min_response_time_ms: i64, status_code: u16) -> Self {
        Self {
            failing: false,
            is_healthy: true,
            min_response_time_ms,
            response_time_ms,
            last_checked_at: Utc::now(),
            error: None,
            status_code: Some(status_code),
        }
    }

    pub fn error_sentinel(error: impl Into<String>) -> Self {
        Self {
            failing: true,
            is_healthy: false,
            min_response_time_ms: 999_999,
            response_time_ms: 999_999,
            last_checked_at: Utc::now(),
            error: Some(error.into()),
            status_code: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProcessorTotals {
    #[serde(rename = "totalRequests")]
    pub total_requests: i64,
    #[serde(rename = "totalAmount")]
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub default: ProcessorTotals,
    pub fallback: ProcessorTotals,
}

/// Query bounds for `GET /payments/summary`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
