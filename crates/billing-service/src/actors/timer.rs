//! Per-session billing timer.
//!
//! Each active session owns one spawned task that emits a [`TimerTick`] every
//! billing unit. Ticks go to the registry actor, which applies them to the live
//! estimate; the timer itself holds no session state.
//!
//! The task stops when its `CancellationToken` is cancelled or the registry's
//! tick channel closes. [`BillingTimerHandle::stop`] cancels and then awaits
//! the task, so no tick is sent after it returns.

use super::messages::TimerTick;
use crate::session::Session;

use common::types::SessionId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Receives a snapshot of the session after every applied tick.
///
/// Notifications run on their own task; an error or panic is logged and
/// never affects later ticks.
#[async_trait::async_trait]
pub trait LiveEstimateObserver: Send + Sync {
    async fn on_live_estimate(&self, session: &Session) -> anyhow::Result<()>;
}

/// Deliver a live-estimate snapshot to `observer` off the registry task.
pub(crate) fn notify_observer(observer: &Arc<dyn LiveEstimateObserver>, snapshot: Session) {
    let observer = Arc::clone(observer);
    tokio::spawn(async move {
        if let Err(e) = observer.on_live_estimate(&snapshot).await {
            warn!(
                target: "billing.timer",
                session_id = %snapshot.id,
                live_units = snapshot.live_units,
                error = %e,
                "Live estimate observer failed"
            );
        }
    });
}

/// Handle to a running billing timer.
#[derive(Debug)]
pub struct BillingTimerHandle {
    session_id: SessionId,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BillingTimerHandle {
    /// Spawn a timer that ticks every `period`, first tick one period from now.
    #[must_use]
    pub fn spawn(
        session_id: SessionId,
        period: Duration,
        tick_tx: mpsc::Sender<TimerTick>,
        cancel_token: CancellationToken,
    ) -> Self {
        let task = tokio::spawn(run_timer(
            session_id,
            period,
            tick_tx,
            cancel_token.clone(),
        ));

        Self {
            session_id,
            cancel_token,
            task: Some(task),
        }
    }

    /// Stop the timer and wait for its task to exit.
    ///
    /// Idempotent. Returns `true` only for the call that stopped it.
    pub async fn stop(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };

        self.cancel_token.cancel();

        if let Err(e) = task.await {
            warn!(
                target: "billing.timer",
                session_id = %self.session_id,
                error = ?e,
                "Billing timer task ended abnormally"
            );
        }

        true
    }

    /// Whether the timer has not been stopped through this handle.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for BillingTimerHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[instrument(skip_all, name = "billing.timer", fields(session_id = %session_id))]
async fn run_timer(
    session_id: SessionId,
    period: Duration,
    tick_tx: mpsc::Sender<TimerTick>,
    cancel_token: CancellationToken,
) {
    debug!(
        target: "billing.timer",
        session_id = %session_id,
        period_secs = period.as_secs(),
        "Billing timer started"
    );

    let mut interval = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => break,

            _ = interval.tick() => {
                // The send can wait on a full registry mailbox; cancellation
                // must still win.
                tokio::select! {
                    biased;

                    () = cancel_token.cancelled() => break,

                    sent = tick_tx.send(TimerTick { session_id }) => {
                        if sent.is_err() {
                            debug!(
                                target: "billing.timer",
                                session_id = %session_id,
                                "Tick channel closed, stopping timer"
                            );
                            break;
                        }
                    }
                }
            }
        }
    }

    debug!(
        target: "billing.timer",
        session_id = %session_id,
        "Billing timer stopped"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(60);

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let (tx, mut rx) = mpsc::channel(16);
        let id = SessionId::new();
        let mut timer = BillingTimerHandle::spawn(id, PERIOD, tx, CancellationToken::new());

        settle().await;
        assert!(rx.try_recv().is_err(), "no tick before the first period");

        for _ in 0..3 {
            tokio::time::advance(PERIOD).await;
            settle().await;
            assert_eq!(rx.try_recv().unwrap(), TimerTick { session_id: id });
        }
        assert!(rx.try_recv().is_err());

        assert!(timer.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_final() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut timer =
            BillingTimerHandle::spawn(SessionId::new(), PERIOD, tx, CancellationToken::new());

        assert!(timer.is_running());
        assert!(timer.stop().await);
        assert!(!timer.stop().await);
        assert!(!timer.is_running());

        tokio::time::advance(PERIOD * 5).await;
        settle().await;
        assert!(rx.try_recv().is_err(), "no ticks after stop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_timer() {
        let (tx, mut rx) = mpsc::channel(16);
        let parent = CancellationToken::new();
        let _timer =
            BillingTimerHandle::spawn(SessionId::new(), PERIOD, tx, parent.child_token());

        parent.cancel();
        settle().await;

        tokio::time::advance(PERIOD * 2).await;
        settle().await;
        // All senders are gone once the task exits.
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unblocks_a_pending_send() {
        // Capacity 1 and nobody reading: the second tick blocks on send.
        let (tx, _rx) = mpsc::channel(1);
        let mut timer =
            BillingTimerHandle::spawn(SessionId::new(), PERIOD, tx, CancellationToken::new());

        tokio::time::advance(PERIOD).await;
        settle().await;
        tokio::time::advance(PERIOD).await;
        settle().await;

        assert!(timer.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_task() {
        let (tx, mut rx) = mpsc::channel(16);
        let timer = BillingTimerHandle::spawn(SessionId::new(), PERIOD, tx, CancellationToken::new());

        drop(timer);
        settle().await;

        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
