//! Synchronous, side-effect-free validation.
//!
//! Every check here returns a simple pass/fail plus a message; none of them
//! touch the network or the store. The dispatcher runs these before
//! attempting a processor call; the summary aggregator runs the
//! `summary_*` checks after every cache hit or store read as a consistency
//! assertion, not a gate.

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use std::sync::OnceLock;
use uuid::Uuid;

fn uuid_v4_regex() -> &'static Regex {
    static UUID_V4: OnceLock<Regex> = OnceLock::new();
    UUID_V4.get_or_init(|| {
        Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
            .expect("valid regex")
    })
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: Option<String>,
}

impl CheckResult {
    fn ok(name: &'static str) -> Self {
        Self { name, passed: true, detail: None }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self { name, passed: false, detail: Some(detail.into()) }
    }
}

pub fn correlation_id_format(raw: &str) -> CheckResult {
    if uuid_v4_regex().is_match(&raw.to_ascii_lowercase()) {
        CheckResult::ok("correlation_id_format")
    } else {
        CheckResult::fail("correlation_id_format", format!("{raw} is not a UUID v4"))
    }
}

/// Strictly positive, at most two fractional digits.
pub fn amount_format(amount: Decimal) -> CheckResult {
    if amount <= Decimal::ZERO {
        return CheckResult::fail("amount_format", "amount must be strictly positive");
    }
    let scaled = amount * Decimal::from(100);
    if scaled.fract() != Decimal::ZERO {
        return CheckResult::fail("amount_format", "amount must have at most two decimal places");
    }
    CheckResult::ok("amount_format")
}

pub fn processor_type(name: &str) -> CheckResult {
    if name == "default" || name == "fallback" {
        CheckResult::ok("processor_type")
    } else {
        CheckResult::fail("processor_type", format!("{name} is not a submittable processor type"))
    }
}

/// The raw string must carry both a `T` separator and a `Z` (UTC) marker,
/// in addition to being a parseable RFC 3339 timestamp.
pub fn timestamp_format(raw: &str) -> CheckResult {
    let looks_utc = raw.contains('T') && raw.contains('Z');
    let parses = DateTime::parse_from_rfc3339(raw).is_ok();
    if looks_utc && parses {
        CheckResult::ok("timestamp_format")
    } else {
        CheckResult::fail("timestamp_format", format!("{raw} is not a UTC RFC3339 timestamp"))
    }
}

pub fn date_range(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> CheckResult {
    match (from, to) {
        (Some(f), Some(t)) if f > t => {
            CheckResult::fail("date_range", format!("from ({f}) is after to ({t})"))
        }
        _ => CheckResult::ok("date_range"),
    }
}

pub fn summary_structure(default_present: bool, fallback_present: bool) -> CheckResult {
    if default_present && fallback_present {
        CheckResult::ok("summary_structure")
    } else {
        CheckResult::fail("summary_structure", "summary must contain both default and fallback keys")
    }
}

pub fn summary_amounts(default_amount: Decimal, fallback_amount: Decimal) -> CheckResult {
    if default_amount >= Decimal::ZERO && fallback_amount >= Decimal::ZERO {
        CheckResult::ok("summary_amounts")
    } else {
        CheckResult::fail("summary_amounts", "summary amounts must be non-negative")
    }
}

pub fn summary_counts(default_count: i64, fallback_count: i64) -> CheckResult {
    if default_count >= 0 && fallback_count >= 0 {
        CheckResult::ok("summary_counts")
    } else {
        CheckResult::fail("summary_counts", "summary counts must be non-negative")
    }
}

/// The actual enforcement of this invariant lives at the store layer: the
/// `correlation_id` unique index plus `ON CONFLICT ... DO NOTHING` (see
/// `ledger::PAYMENTS_SCHEMA`) make a duplicate insert a no-op rather than an
/// error. This is the process-local, best-effort mirror of that guarantee
/// for callers (like the in-memory ledger double) that have no real unique
/// constraint to fall back on.
pub fn no_duplicate_correlation_id(already_recorded: &[Uuid], candidate: Uuid) -> CheckResult {
    if already_recorded.contains(&candidate) {
        CheckResult::fail("no_duplicate_correlation_id", format!("{candidate} already recorded"))
    } else {
        CheckResult::ok("no_duplicate_correlation_id")
    }
}

/// Runs the validation checks the dispatcher needs before attempting a
/// processor call. Returns the first failure, if any.
pub fn validate_submission(correlation_id: &str, amount: Decimal) -> Option<CheckResult> {
    let checks = [correlation_id_format(correlation_id), amount_format(amount)];
    checks.into_iter().find(|c| !c.passed)
}
