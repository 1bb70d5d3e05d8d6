//! Metrics definitions for the auth gate.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gate_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! Only the `metrics` facade is used here. Without an installed recorder every
//! call is a no-op, so the embedding service decides whether and how these
//! are exported.
//!
//! # Cardinality
//!
//! Every label value is a `&'static str` chosen by this crate:
//! - `outcome`: forwarded, rejected
//! - `reason`: bounded by `AuthError::reason`
//! - `status`: success, plus `FetchError::reason` values
//! - `result`: hit, miss, empty

use metrics::{counter, histogram};
use std::time::Duration;

/// Record the terminal state of one gated request.
///
/// Metric: `gate_requests_total`
/// Labels: `outcome`
pub fn record_gate_outcome(outcome: &'static str) {
    counter!("gate_requests_total", "outcome" => outcome).increment(1);
}

/// Record why a request was rejected.
///
/// Metric: `gate_rejections_total`
/// Labels: `reason`
pub fn record_rejection(reason: &'static str) {
    counter!("gate_rejections_total", "reason" => reason).increment(1);
}

/// Record one JWKS fetch.
///
/// Metric: `gate_jwks_fetch_total`, `gate_jwks_fetch_duration_seconds`
/// Labels: `status`
pub fn record_jwks_fetch(status: &'static str, duration: Duration) {
    histogram!("gate_jwks_fetch_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("gate_jwks_fetch_total", "status" => status).increment(1);
}

/// Record a key lookup against the cache.
///
/// Metric: `gate_jwks_cache_lookups_total`
/// Labels: `result` (hit, miss, empty)
pub fn record_cache_lookup(result: &'static str) {
    counter!("gate_jwks_cache_lookups_total", "result" => result).increment(1);
}

/// Record an explicit invalidation caused by an unknown kid.
///
/// Metric: `gate_jwks_invalidations_total`
pub fn record_invalidation() {
    counter!("gate_jwks_invalidations_total").increment(1);
}
