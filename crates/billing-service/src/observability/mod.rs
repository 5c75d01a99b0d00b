//! Observability for the billing engine.
//!
//! # Privacy by Default
//!
//! Instrumented functions use `#[instrument(skip_all)]` with explicit fields.
//! Credential tokens and the signing certificate are never logged.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `billing_sessions_active` | Gauge | none | Sessions currently metering |
//! | `billing_sessions_started_total` | Counter | `kind` | Session starts |
//! | `billing_sessions_finalized_total` | Counter | `status` | First finalizations |
//! | `billing_sessions_evicted_total` | Counter | none | Retention evictions |
//! | `billing_timer_ticks_total` | Counter | none | Applied live-estimate ticks |
//! | `billing_live_drift_units_total` | Counter | none | Live vs final divergence |
//! | `billing_affordability_check_duration_seconds` | Histogram | `outcome` | Ledger read latency |
//! | `billing_payouts_total` | Counter | `status` | Payout outcomes |
//! | `billing_payout_batch_duration_seconds` | Histogram | none | Payout batch duration |
//! | `billing_actor_mailbox_depth` | Gauge | `actor_type` | Registry backpressure |
//! | `billing_errors_total` | Counter | `operation`, `error_type` | Operation failures |

pub mod metrics;

pub use metrics::init_metrics_recorder;
