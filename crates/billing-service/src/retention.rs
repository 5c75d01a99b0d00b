//! Retention sweeper background task.
//!
//! Periodically evicts terminal sessions whose end time is older than the
//! retention window. Active sessions are never touched.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is cancelled. A sweep in
//! progress completes first.

use crate::actors::SessionRegistryHandle;
use crate::config::{DEFAULT_RETENTION_WINDOW_SECONDS, DEFAULT_SWEEP_INTERVAL_SECONDS};

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Configuration for the retention sweeper.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Sweep interval in seconds.
    pub sweep_interval_seconds: u64,
    /// How long terminal sessions are kept after they end.
    pub retention_window_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            retention_window_seconds: DEFAULT_RETENTION_WINDOW_SECONDS,
        }
    }
}

impl RetentionConfig {
    #[must_use]
    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention_window_seconds)
    }
}

/// Start the retention sweeper.
///
/// Returns when `cancel_token` is cancelled or the registry has shut down.
#[instrument(skip_all, name = "billing.task.retention")]
pub async fn start_retention_sweeper(
    registry: SessionRegistryHandle,
    config: RetentionConfig,
    cancel_token: CancellationToken,
) {
    info!(
        target: "billing.task.retention",
        sweep_interval_seconds = config.sweep_interval_seconds,
        retention_window_seconds = config.retention_window_seconds,
        "Starting retention sweeper"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.sweep_interval_seconds));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if !run_sweep(&registry, &config).await {
                    break;
                }
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "billing.task.retention",
                    "Retention sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "billing.task.retention", "Retention sweeper stopped");
}

/// Run a single sweep.
///
/// Returns `false` if the registry is gone and the sweeper should stop.
pub(crate) async fn run_sweep(registry: &SessionRegistryHandle, config: &RetentionConfig) -> bool {
    match registry.sweep(config.retention_window()).await {
        Ok(report) => {
            if report.timers_stopped > 0 {
                warn!(
                    target: "billing.task.retention",
                    timers_stopped = report.timers_stopped,
                    "Evicted sessions still had running timers"
                );
            }
            if report.evicted > 0 {
                info!(
                    target: "billing.task.retention",
                    evicted = report.evicted,
                    retention_window_seconds = config.retention_window_seconds,
                    "Evicted expired sessions"
                );
            }
            true
        }
        Err(e) => {
            error!(
                target: "billing.task.retention",
                error = %e,
                "Retention sweep failed"
            );
            !registry.is_cancelled()
        }
    }
}
