//! Cache key conventions. Centralized so invalidation and lookup never drift.

use chrono::{DateTime, Utc};

pub fn health_cache_hash() -> &'static str {
    "health:cache"
}

pub fn health_last_check_hash() -> &'static str {
    "health:last_check"
}

pub fn health_response_times(processor: &str) -> String {
    format!("health:response_times:{processor}")
}

fn ts_or_null(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339()).unwrap_or_else(|| "null".to_string())
}

pub fn summary(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> String {
    format!("payment:summary:{}:{}", ts_or_null(from), ts_or_null(to))
}

pub fn summary_pattern() -> &'static str {
    "payment:summary:*"
}

pub fn correlation(id: &str) -> String {
    format!("payment:correlation:{id}")
}
