//! Error taxonomy shared by the dispatch core and the HTTP boundary.
//!
//! One enum, one `error_type` label per variant, one HTTP status mapping —
//! the core and the API layer use the same errors instead of translating
//! between two.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Circuit breaker short-circuited the call; the dispatcher treats this
    /// like a processor failure and moves on to the other processor.
    #[error("circuit open for {processor}")]
    Open { processor: String },

    #[error("transient processor error: {0}")]
    Transient(String),

    #[error("permanent processor error ({status}): {message}")]
    Permanent { status: u16, message: String },

    #[error("ledger write failed: {0}")]
    Persistence(String),

    #[error("cache degraded: {0}")]
    CacheDegraded(String),

    #[error("both processors unavailable")]
    Unavailable,
}

impl AppError {
    /// Stable label used in logs and Prometheus labels.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Open { .. } => "OPEN",
            Self::Transient(_) => "TRANSIENT",
            Self::Permanent { .. } => "PERMANENT",
            Self::Persistence(_) => "PERSISTENCE",
            Self::CacheDegraded(_) => "CACHE_DEGRADED",
            Self::Unavailable => "UNAVAILABLE",
        }
    }

    /// Whether the retry coordinator should attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Open { .. } | Self::Transient(_) | Self::Permanent { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CacheDegraded(_) => StatusCode::OK,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "errorType": self.error_type(),
        }));
        (status, body).into_response()
    }
}

/// Classifies an HTTP status returned by a processor into the taxonomy above.
pub fn classify_processor_status(status: u16, message: impl Into<String>) -> AppError {
    let message = message.into();
    if (500..600).contains(&status) {
        AppError::Transient(message)
    } else if status == 408 || status == 429 {
        AppError::Transient(message)
    } else {
        AppError::Permanent { status, message }
    }
}

/// Classifies a transport-level failure (timeout, connection refused, DNS) as transient.
pub fn classify_transport_error(err: &reqwest::Error) -> AppError {
    AppError::Transient(err.to_string())
}

/// Used by the retry coordinator to log a bounded wait before re-raising the
/// last error the loop saw.
pub fn retry_exhausted(last: AppError, attempts: u32, elapsed: Duration) -> AppError {
    if is_expected_degradation(&last) {
        tracing::debug!(
            attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            error_type = last.error_type(),
            "retry attempts exhausted"
        );
    } else {
        tracing::warn!(
            attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            error_type = last.error_type(),
            "retry attempts exhausted"
        );
    }
    last
}

/// Decides a log level for a dispatch-path error without matching every arm
/// at each call site.
fn is_expected_degradation(err: &AppError) -> bool {
    matches!(err, AppError::CacheDegraded(_) | AppError::Open { .. })
}
