//! Metrics Recorder: a bounded in-process ring for cheap percentile math,
//! combined with Prometheus counters/histograms for external scraping.
//!
//! The Prometheus half follows `rpc::metrics` (`lazy_static!` +
//! `register_int_counter_vec!`); the ring half is new, since the teacher
//! has nowhere that computes percentiles in-process.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

lazy_static! {
    static ref PAYMENT_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "payment_requests_total",
        "Total payment attempts by processor and outcome",
        &["processor", "outcome"]
    )
    .expect("payment_requests_total metric");

    static ref PAYMENT_LATENCY: HistogramVec = register_histogram_vec!(
        "payment_latency_seconds",
        "Processor call latency in seconds",
        &["processor"]
    )
    .expect("payment_latency_seconds metric");

    static ref CIRCUIT_BREAKER_STATE: IntGaugeVec = register_int_gauge_vec!(
        "circuit_breaker_state",
        "Circuit breaker state (0=closed, 1=open, 2=half-open)",
        &["processor"]
    )
    .expect("circuit_breaker_state metric");
}

pub fn set_circuit_breaker_state(processor: &str, state: i64) {
    CIRCUIT_BREAKER_STATE.with_label_values(&[processor]).set(state);
}

struct Outcome {
    at: Instant,
    duration_ms: u64,
    success: bool,
}

const RING_CAPACITY: usize = 1000;
const THROUGHPUT_WINDOW: Duration = Duration::from_secs(60);

pub struct MetricsRecorder {
    ring: Mutex<VecDeque<Outcome>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PerformanceSnapshot {
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub throughput_per_sec: f64,
    pub success_rate: f64,
    pub sample_size: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self { ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)) }
    }

    pub fn record(&self, processor: &str, latency: Duration, success: bool) {
        let outcome_label = if success { "success" } else { "failure" };
        PAYMENT_REQUESTS.with_label_values(&[processor, outcome_label]).inc();
        PAYMENT_LATENCY.with_label_values(&[processor]).observe(latency.as_secs_f64());

        let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        if ring.len() == RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(Outcome { at: Instant::now(), duration_ms: latency.as_millis() as u64, success });
    }

    pub fn snapshot(&self, p99_threshold_ms: u64) -> PerformanceSnapshot {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        let tail: Vec<&Outcome> = ring.iter().rev().take(100).collect();

        if tail.is_empty() {
            return PerformanceSnapshot {
                avg_ms: 0.0,
                p50_ms: 0.0,
                p95_ms: 0.0,
                p99_ms: 0.0,
                min_ms: 0.0,
                max_ms: 0.0,
                throughput_per_sec: 0.0,
                success_rate: 0.0,
                sample_size: 0,
            };
        }

        let mut durations: Vec<u64> = tail.iter().map(|o| o.duration_ms).collect();
        durations.sort_unstable();

        let percentile = |p: f64| -> f64 {
            let idx = ((durations.len() as f64 - 1.0) * p).round() as usize;
            durations[idx] as f64
        };

        let sum: u64 = durations.iter().sum();
        let avg = sum as f64 / durations.len() as f64;
        let successes = tail.iter().filter(|o| o.success).count();
        let success_rate = successes as f64 / tail.len() as f64;

        let now = Instant::now();
        let recent = ring.iter().filter(|o| now.duration_since(o.at) <= THROUGHPUT_WINDOW).count();
        let throughput = recent as f64 / THROUGHPUT_WINDOW.as_secs_f64();

        let p99 = percentile(0.99);
        if p99 > p99_threshold_ms as f64 {
            tracing::warn!(p99_ms = p99, threshold_ms = p99_threshold_ms, "p99 latency exceeds threshold");
        }

        PerformanceSnapshot {
            avg_ms: avg,
            p50_ms: percentile(0.50),
            p95_ms: percentile(0.95),
            p99_ms: p99,
            min_ms: *durations.first().unwrap() as f64,
            max_ms: *durations.last().unwrap() as f64,
            throughput_per_sec: throughput,
            success_rate,
            sample_size: tail.len(),
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
