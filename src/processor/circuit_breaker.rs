//! Per-processor circuit breaker: CLOSED → OPEN → HALF_OPEN.
//!
//! Adapted from the teacher's RPC circuit breaker. Two differences from
//! that original: the reset out of HALF_OPEN happens on a single success
//! (the spec does not define a `success_threshold` gate), and state now
//! tracks a bounded response-time ring plus a monotonic request counter
//! for the stats endpoints.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerSettings;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    failure_count: u32,
    success_count: u64,
    total_requests: u64,
    last_failure_at: Option<Instant>,
    response_times: VecDeque<u64>,
}

pub struct CircuitBreaker {
    name: String,
    inner: Mutex<Inner>,
    failure_threshold: u32,
    reset_timeout: Duration,
    ring_capacity: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: &'static str,
    pub failure_count: u32,
    pub success_count: u64,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: &CircuitBreakerSettings) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                total_requests: 0,
                last_failure_at: None,
                response_times: VecDeque::with_capacity(settings.ring_capacity),
            }),
            failure_threshold: settings.failure_threshold,
            reset_timeout: settings.reset_timeout,
            ring_capacity: settings.ring_capacity,
        }
    }

    /// Checks whether the breaker currently rejects calls, performing the
    /// OPEN → HALF_OPEN transition if the reset timeout has elapsed.
    fn should_reject(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            BreakerState::Open => {
                let elapsed = inner.last_failure_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                    false
                } else {
                    true
                }
            }
            BreakerState::Closed | BreakerState::HalfOpen => false,
        }
    }

    fn record_success(&self, latency: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.total_requests += 1;
        inner.success_count += 1;
        if inner.response_times.len() == self.ring_capacity {
            inner.response_times.pop_front();
        }
        inner.response_times.push_back(latency.as_millis() as u64);
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Closed;
        }
        inner.failure_count = 0;
    }

    fn record_failure(&self, latency: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.total_requests += 1;
        if inner.response_times.len() == self.ring_capacity {
            inner.response_times.pop_front();
        }
        inner.response_times.push_back(latency.as_millis() as u64);
        inner.last_failure_at = Some(Instant::now());
        inner.failure_count += 1;
        if inner.state == BreakerState::HalfOpen || inner.failure_count >= self.failure_threshold {
            inner.state = BreakerState::Open;
        }
    }

    /// Runs `f` unless the breaker is open. Only the final outcome of `f`
    /// informs the breaker's counters — `f` is expected to already be a
    /// complete retry sequence (see `dispatcher.rs`), not a single network
    /// call, so inner retries never individually trip the breaker.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        if self.should_reject() {
            return Err(AppError::Open { processor: self.name.clone() });
        }

        let start = Instant::now();
        let result = f().await;
        let latency = start.elapsed();

        match &result {
            Ok(_) => self.record_success(latency),
            Err(_) => self.record_failure(latency),
        }

        result
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let avg = if inner.response_times.is_empty() {
            0.0
        } else {
            inner.response_times.iter().sum::<u64>() as f64 / inner.response_times.len() as f64
        };
        BreakerStats {
            name: self.name.clone(),
            state: match inner.state {
                BreakerState::Closed => "closed",
                BreakerState::Open => "open",
                BreakerState::HalfOpen => "half_open",
            },
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            avg_response_time_ms: avg,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure_at = None;
        inner.response_times.clear();
    }
}
