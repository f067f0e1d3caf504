//! Bounded, in-process audit trail.
//!
//! Diagnostic only — not part of the ledger. Answers `/health/audit` without
//! a store round trip. Capacity is fixed; the oldest entry is dropped when
//! a new one arrives at capacity.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

const CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub correlation_id: Uuid,
    pub processor: String,
    pub outcome: String,
    pub error_kind: Option<String>,
    pub latency_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self { entries: Mutex::new(VecDeque::with_capacity(CAPACITY)) }
    }

    pub fn record(&self, entry: AuditEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == CAPACITY {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn for_correlation_id(&self, id: Uuid) -> Vec<AuditEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().filter(|e| e.correlation_id == id).cloned().collect()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
