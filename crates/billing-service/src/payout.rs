//! Provider payouts.
//!
//! [`PayoutScheduler`] moves pending provider earnings to their payment-rail
//! destination. A payout below the minimum threshold never reaches the rail.
//! Rail failures are reported as structured outcomes and never abort the rest
//! of a batch.
//!
//! [`start_payout_task`] drains the [`EarningsLedger`] on a fixed interval and
//! records successful transfers back into it.

use crate::observability::metrics as billing_metrics;
use crate::services::{to_minor_units, PaymentRail, TransferRequest};
use crate::settlement::EarningsLedger;

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A provider's pending earnings, ready to be paid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutRequest {
    pub provider_id: String,
    pub pending_amount: Decimal,
    pub destination_account: String,
}

/// Why a payout did not transfer funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum PayoutFailure {
    BelowMinimum,
    TransferFailed(String),
}

impl PayoutFailure {
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            PayoutFailure::BelowMinimum => "below minimum",
            PayoutFailure::TransferFailed(message) => message,
        }
    }
}

/// Outcome of one provider payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutOutcome {
    pub provider_id: String,
    pub amount: Decimal,
    pub success: bool,
    pub transfer_reference: Option<String>,
    pub failure: Option<PayoutFailure>,
}

impl PayoutOutcome {
    fn paid(provider_id: &str, amount: Decimal, reference: String) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            amount,
            success: true,
            transfer_reference: Some(reference),
            failure: None,
        }
    }

    fn failed(provider_id: &str, amount: Decimal, failure: PayoutFailure) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            amount,
            success: false,
            transfer_reference: None,
            failure: Some(failure),
        }
    }
}

/// Aggregated result of a payout batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PayoutBatchReport {
    pub outcomes: Vec<PayoutOutcome>,
}

impl PayoutBatchReport {
    /// Sum of successfully transferred amounts.
    #[must_use]
    pub fn total_paid(&self) -> Decimal {
        self.outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.amount)
            .sum()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    #[must_use]
    pub fn below_minimum(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.failure == Some(PayoutFailure::BelowMinimum))
            .count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.failure, Some(PayoutFailure::TransferFailed(_))))
            .count()
    }
}

/// Transfers provider earnings through the payment rail.
pub struct PayoutScheduler {
    rail: Arc<dyn PaymentRail>,
    minimum_payout: Decimal,
    currency: String,
}

impl PayoutScheduler {
    #[must_use]
    pub fn new(rail: Arc<dyn PaymentRail>, minimum_payout: Decimal, currency: String) -> Self {
        Self {
            rail,
            minimum_payout,
            currency,
        }
    }

    #[must_use]
    pub fn minimum_payout(&self) -> Decimal {
        self.minimum_payout
    }

    /// Pay out one provider.
    ///
    /// Below the minimum threshold no rail call is made.
    #[instrument(skip_all, name = "billing.payout", fields(provider_id = %provider_id))]
    pub async fn run_daily_payout(
        &self,
        provider_id: &str,
        pending_amount: Decimal,
        destination_account: &str,
    ) -> PayoutOutcome {
        if pending_amount < self.minimum_payout {
            billing_metrics::record_payout("below_minimum");
            debug!(
                target: "billing.task.payout",
                provider_id = %provider_id,
                pending_amount = %pending_amount,
                minimum_payout = %self.minimum_payout,
                "Pending earnings below payout minimum"
            );
            return PayoutOutcome::failed(provider_id, pending_amount, PayoutFailure::BelowMinimum);
        }

        let amount_minor = match to_minor_units(pending_amount) {
            Ok(minor) => minor,
            Err(e) => {
                billing_metrics::record_payout("failed");
                return PayoutOutcome::failed(
                    provider_id,
                    pending_amount,
                    PayoutFailure::TransferFailed(e.to_string()),
                );
            }
        };

        let request = TransferRequest {
            destination_account: destination_account.to_string(),
            amount_minor,
            currency: self.currency.clone(),
            provider_id: provider_id.to_string(),
        };

        match self.rail.transfer(&request).await {
            Ok(receipt) => {
                billing_metrics::record_payout("success");
                info!(
                    target: "billing.task.payout",
                    provider_id = %provider_id,
                    amount = %pending_amount,
                    transfer_reference = %receipt.reference,
                    "Payout transferred"
                );
                PayoutOutcome::paid(provider_id, pending_amount, receipt.reference)
            }
            Err(e) => {
                billing_metrics::record_payout("failed");
                warn!(
                    target: "billing.task.payout",
                    provider_id = %provider_id,
                    amount = %pending_amount,
                    error = %e,
                    "Payout transfer failed"
                );
                PayoutOutcome::failed(
                    provider_id,
                    pending_amount,
                    PayoutFailure::TransferFailed(e.to_string()),
                )
            }
        }
    }

    /// Pay out every request in order. One provider's failure never affects
    /// another's.
    pub async fn run_batch(&self, requests: &[PayoutRequest]) -> PayoutBatchReport {
        let started = Instant::now();
        let mut report = PayoutBatchReport::default();

        for request in requests {
            let outcome = self
                .run_daily_payout(
                    &request.provider_id,
                    request.pending_amount,
                    &request.destination_account,
                )
                .await;
            report.outcomes.push(outcome);
        }

        billing_metrics::record_payout_batch(started.elapsed());
        report
    }
}

impl std::fmt::Debug for PayoutScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayoutScheduler")
            .field("minimum_payout", &self.minimum_payout)
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

/// Start the periodic payout task.
///
/// Exits when `cancel_token` is cancelled. A batch in progress is finished
/// first.
#[instrument(skip_all, name = "billing.task.payout")]
pub async fn start_payout_task(
    scheduler: Arc<PayoutScheduler>,
    earnings: Arc<EarningsLedger>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "billing.task.payout",
        interval_seconds = interval.as_secs(),
        minimum_payout = %scheduler.minimum_payout(),
        "Starting payout task"
    );

    let mut ticker = tokio::time::interval(interval);
    // The immediate first tick would pay out at startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_payout_cycle(&scheduler, &earnings).await;
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "billing.task.payout",
                    "Payout task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "billing.task.payout", "Payout task stopped");
}

/// Run one payout cycle over every payable provider.
///
/// Successful transfers are recorded in `earnings`.
pub async fn run_payout_cycle(
    scheduler: &PayoutScheduler,
    earnings: &EarningsLedger,
) -> PayoutBatchReport {
    let requests = earnings.payable().await;
    if requests.is_empty() {
        debug!(target: "billing.task.payout", "No providers with pending earnings");
        return PayoutBatchReport::default();
    }

    let report = scheduler.run_batch(&requests).await;

    for outcome in report.outcomes.iter().filter(|o| o.success) {
        if let Err(e) = earnings.mark_paid(&outcome.provider_id, outcome.amount).await {
            error!(
                target: "billing.task.payout",
                provider_id = %outcome.provider_id,
                amount = %outcome.amount,
                error = %e,
                "Transferred payout could not be recorded"
            );
        }
    }

    info!(
        target: "billing.task.payout",
        providers = report.outcomes.len(),
        succeeded = report.succeeded(),
        below_minimum = report.below_minimum(),
        failed = report.failed(),
        total_paid = %report.total_paid(),
        "Payout cycle complete"
    );

    report
}
