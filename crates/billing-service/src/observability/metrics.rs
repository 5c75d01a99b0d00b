//! Metrics definitions for the billing engine.
//!
//! All metrics follow Prometheus naming conventions:
//! - `billing_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `status`: session statuses (4) or payout outcomes (3)
//! - `kind`: session kinds (3)
//! - `operation`: bounded by engine operations (~10)
//! - `error_type`: bounded by `BillingError` variants
//!
//! Session, payer and provider ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle
/// the host application serves metrics from.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Ledger reads on the start path
        .set_buckets_for_metric(
            Matcher::Prefix("billing_affordability".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set affordability check buckets: {e}"))?
        // Payout batches make one rail call per provider
        .set_buckets_for_metric(
            Matcher::Prefix("billing_payout_batch".to_string()),
            &[0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000],
        )
        .map_err(|e| format!("Failed to set payout batch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session Lifecycle
// ============================================================================

/// Set the number of active sessions.
///
/// Metric: `billing_sessions_active`
pub fn set_sessions_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("billing_sessions_active").set(count as f64);
}

/// Record a session start.
///
/// Metric: `billing_sessions_started_total`
/// Labels: `kind`
pub fn record_session_started(kind: &str) {
    counter!("billing_sessions_started_total", "kind" => kind.to_string()).increment(1);
}

/// Record a first finalization.
///
/// Metric: `billing_sessions_finalized_total`
/// Labels: `status` (completed, cancelled, disputed)
pub fn record_session_finalized(status: &str) {
    counter!("billing_sessions_finalized_total", "status" => status.to_string()).increment(1);
}

/// Record sessions evicted by the retention sweeper.
///
/// Metric: `billing_sessions_evicted_total`
pub fn record_sessions_evicted(count: usize) {
    counter!("billing_sessions_evicted_total").increment(count as u64);
}

// ============================================================================
// Billing Timer
// ============================================================================

/// Record an applied timer tick.
///
/// Metric: `billing_timer_ticks_total`
pub fn record_timer_tick() {
    counter!("billing_timer_ticks_total").increment(1);
}

/// Record the live/final divergence of a finalized session.
///
/// Metric: `billing_live_drift_units_total` (absolute units)
pub fn record_live_drift(drift_units: i64) {
    counter!("billing_live_drift_units_total").increment(drift_units.unsigned_abs());
}

// ============================================================================
// Balance & Payouts
// ============================================================================

/// Record an affordability check.
///
/// Metric: `billing_affordability_check_duration_seconds`
/// Labels: `outcome` (sufficient, insufficient, error)
pub fn record_affordability_check(outcome: &str, duration: Duration) {
    histogram!("billing_affordability_check_duration_seconds", "outcome" => outcome.to_string())
        .record(duration.as_secs_f64());
}

/// Record one payout outcome.
///
/// Metric: `billing_payouts_total`
/// Labels: `status` (success, below_minimum, failed)
pub fn record_payout(status: &str) {
    counter!("billing_payouts_total", "status" => status.to_string()).increment(1);
}

/// Record a payout batch run.
///
/// Metric: `billing_payout_batch_duration_seconds`
pub fn record_payout_batch(duration: Duration) {
    histogram!("billing_payout_batch_duration_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Actors & Errors
// ============================================================================

/// Set the registry mailbox depth.
///
/// Metric: `billing_actor_mailbox_depth`
pub fn set_registry_mailbox_depth(depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("billing_actor_mailbox_depth", "actor_type" => "registry").set(depth as f64);
}

/// Record an operation error.
///
/// Metric: `billing_errors_total`
/// Labels: `operation`, `error_type`
pub fn record_error(operation: &str, error_type: &str) {
    counter!(
        "billing_errors_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}
