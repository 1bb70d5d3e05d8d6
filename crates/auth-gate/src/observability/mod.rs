//! Observability for the auth gate.
//!
//! - `metrics` - counters and histograms via the `metrics` facade

pub mod metrics;
