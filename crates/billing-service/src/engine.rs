//! `BillingEngine` - the public facade.
//!
//! Owns the registry actor, the balance guard, the earnings ledger and the
//! payout scheduler, all built from an injected [`Config`] and collaborators.
//! Ledger reads and payout transfers are awaited here, never inside the
//! registry actor.
//!
//! Finalizing and settling a session run together on a spawned task, so a
//! caller that stops waiting cannot leave a charged session uncredited.
//! Earnings are credited exactly once per `Completed` or `Cancelled`
//! session under the key `session:{id}`. A `Disputed` session computes its
//! split but credits nothing.

use crate::actors::{
    FinalizeOutcome, LiveEstimateObserver, RegistryDeps, RegistrySettings, RegistryStatus,
    SessionRegistryHandle, StartRequest, StartedSession, SweepReport,
};
use crate::balance::{AffordabilityReport, BalanceGuard};
use crate::clock::Clock;
use crate::config::Config;
use crate::errors::BillingError;
use crate::observability::metrics as billing_metrics;
use crate::payout::{
    run_payout_cycle, start_payout_task, PayoutBatchReport, PayoutOutcome, PayoutScheduler,
};
use crate::retention::{start_retention_sweeper, RetentionConfig};
use crate::services::{LedgerStore, PaymentRail};
use crate::session::{
    validate_rate, RateCard, Session, SessionKind, SessionStatus, TranscriptMessage,
};
use crate::settlement::splitter::ensure_currency_amount;
use crate::settlement::{split, CommissionPolicy, EarningsLedger, ProviderEarnings, SettlementSplit};
use crate::tokens::{CredentialSet, TokenClaims, TokenError, TokenIssuer};

use common::types::SessionId;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn, Instrument};
use uuid::Uuid;

/// External collaborators injected into the engine.
pub struct EngineCollaborators {
    pub ledger: Arc<dyn LedgerStore>,
    pub payment_rail: Arc<dyn PaymentRail>,
    pub clock: Arc<dyn Clock>,
    /// Receives live estimates after every timer tick.
    pub observer: Option<Arc<dyn LiveEstimateObserver>>,
}

/// A finalized session and what was settled for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedSession {
    pub session: Session,
    /// Split of the final cost.
    pub settlement: Option<SettlementSplit>,
    /// Whether this call credited the provider's earnings.
    pub credited: bool,
    /// The session was already terminal; its record did not change.
    pub already_finalized: bool,
}

/// Real-time session billing engine.
pub struct BillingEngine {
    registry: SessionRegistryHandle,
    balance: BalanceGuard,
    earnings: Arc<EarningsLedger>,
    payouts: Arc<PayoutScheduler>,
    issuer: Arc<TokenIssuer>,
    clock: Arc<dyn Clock>,
    commission: CommissionPolicy,
    rate_card: RateCard,
    min_start_units: u64,
    retention: RetentionConfig,
    payout_interval: Duration,
    cancel_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BillingEngine {
    /// Build the engine and spawn its registry actor.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: &Config, collaborators: EngineCollaborators) -> Self {
        let cancel_token = CancellationToken::new();

        let issuer = Arc::new(TokenIssuer::new(
            config.token_app_id.clone(),
            config.token_app_certificate.clone(),
            Arc::clone(&collaborators.clock),
        ));

        let (registry, registry_task) = SessionRegistryHandle::spawn(
            RegistrySettings {
                billing_unit: config.billing_unit(),
                credential_ttl: config.credential_ttl(),
            },
            RegistryDeps {
                issuer: Arc::clone(&issuer),
                clock: Arc::clone(&collaborators.clock),
                observer: collaborators.observer,
            },
            cancel_token.child_token(),
        );

        let payouts = Arc::new(PayoutScheduler::new(
            collaborators.payment_rail,
            config.minimum_payout,
            config.payout_currency.clone(),
        ));

        info!(
            target: "billing.engine",
            billing_unit_seconds = config.billing_unit_seconds,
            platform_rate = %config.commission.platform_rate(),
            provider_rate = %config.commission.provider_rate(),
            minimum_payout = %config.minimum_payout,
            "Billing engine started"
        );

        Self {
            registry,
            balance: BalanceGuard::new(collaborators.ledger),
            earnings: Arc::new(EarningsLedger::new()),
            payouts,
            issuer,
            clock: collaborators.clock,
            commission: config.commission,
            rate_card: config.rate_card,
            min_start_units: config.min_start_units,
            retention: RetentionConfig {
                sweep_interval_seconds: config.sweep_interval_seconds,
                retention_window_seconds: config.retention_window_seconds,
            },
            payout_interval: Duration::from_secs(config.payout_interval_seconds),
            cancel_token,
            tasks: Mutex::new(vec![registry_task]),
        }
    }

    /// Start a metered session.
    ///
    /// The payer must be able to afford the configured minimum number of
    /// units at `rate_per_unit`.
    ///
    /// # Errors
    ///
    /// - `InvalidRate` for a non-positive or sub-cent rate
    /// - `InsufficientBalance` if the payer cannot afford the minimum
    /// - `AffordabilityCheckFailed` if the ledger cannot be read
    #[instrument(skip_all, name = "billing.engine.start_session", fields(payer_id = %payer_id, provider_id = %provider_id))]
    pub async fn start_session(
        &self,
        payer_id: &str,
        provider_id: &str,
        kind: SessionKind,
        rate_per_unit: Decimal,
    ) -> Result<StartedSession, BillingError> {
        let result = async {
            validate_rate(rate_per_unit)?;

            let report = self
                .balance
                .check_affordability(payer_id, self.min_start_units, rate_per_unit)
                .await?;
            if !report.sufficient {
                return Err(BillingError::InsufficientBalance {
                    current_balance: report.current_balance,
                    estimated_cost: report.estimated_cost,
                });
            }

            self.registry
                .start(StartRequest {
                    payer_id: payer_id.to_string(),
                    provider_id: provider_id.to_string(),
                    kind,
                    rate_per_unit,
                })
                .await
        }
        .await;

        observe("start_session", result)
    }

    /// Start a session at the rate card price for `kind`.
    ///
    /// # Errors
    ///
    /// See [`BillingEngine::start_session`].
    pub async fn start_session_at_card_rate(
        &self,
        payer_id: &str,
        provider_id: &str,
        kind: SessionKind,
    ) -> Result<StartedSession, BillingError> {
        let rate = self.rate_card.rate_for(kind);
        self.start_session(payer_id, provider_id, kind, rate).await
    }

    /// End a session normally.
    ///
    /// Ending an already-finalized session returns its existing record with
    /// `already_finalized` set. Its settlement is re-applied under the same
    /// key, which only credits if an earlier finalize never got that far.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` for an unknown or evicted session.
    pub async fn end_session(&self, session_id: SessionId) -> Result<FinalizedSession, BillingError> {
        observe(
            "end_session",
            self.finalize(session_id, SessionStatus::Completed, None).await,
        )
    }

    /// Cancel a session. Usage up to now is still charged.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` for an unknown or evicted session.
    pub async fn cancel_session(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> Result<FinalizedSession, BillingError> {
        observe(
            "cancel_session",
            self.finalize(session_id, SessionStatus::Cancelled, Some(reason.to_string()))
                .await,
        )
    }

    /// Mark a session disputed. The final cost is computed but the provider
    /// is not credited.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` for an unknown or evicted session.
    pub async fn dispute_session(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> Result<FinalizedSession, BillingError> {
        observe(
            "dispute_session",
            self.finalize(session_id, SessionStatus::Disputed, Some(reason.to_string()))
                .await,
        )
    }

    #[instrument(skip_all, name = "billing.engine.finalize", fields(session_id = %session_id, status = status.as_str()))]
    async fn finalize(
        &self,
        session_id: SessionId,
        status: SessionStatus,
        reason: Option<String>,
    ) -> Result<FinalizedSession, BillingError> {
        let registry = self.registry.clone();
        let earnings = Arc::clone(&self.earnings);
        let commission = self.commission;

        // Finalize and settle run to completion even if this future is dropped.
        let task = tokio::spawn(
            async move {
                let outcome = registry.finalize(session_id, status, reason).await?;
                settle_session(&earnings, &commission, outcome).await
            }
            .in_current_span(),
        );

        task.await
            .map_err(|e| BillingError::Internal(format!("settlement task failed: {e}")))?
    }

    /// Append a message to an active session's transcript.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` for an unknown session, `AlreadyEnded` once it is
    /// finalized.
    pub async fn append_message(
        &self,
        session_id: SessionId,
        sender_id: &str,
        body: &str,
    ) -> Result<(), BillingError> {
        let message = TranscriptMessage::new(sender_id, body, self.clock.now());
        observe(
            "append_message",
            self.registry.append_message(session_id, message).await,
        )
    }

    /// Transcript in insertion order. Available until the session is evicted.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` for an unknown or evicted session.
    pub async fn get_transcript(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<TranscriptMessage>, BillingError> {
        observe(
            "get_transcript",
            self.registry.get_transcript(session_id).await,
        )
    }

    /// Look up a session. `Ok(None)` if unknown or evicted.
    ///
    /// # Errors
    ///
    /// `Internal` if the registry has shut down.
    pub async fn get_session(&self, session_id: SessionId) -> Result<Option<Session>, BillingError> {
        self.registry.get(session_id).await
    }

    /// Whether `payer_id` can afford `estimated_units` at `rate_per_unit`.
    ///
    /// # Errors
    ///
    /// `AffordabilityCheckFailed` if the ledger cannot be read.
    pub async fn check_affordability(
        &self,
        payer_id: &str,
        estimated_units: u64,
        rate_per_unit: Decimal,
    ) -> Result<AffordabilityReport, BillingError> {
        observe(
            "check_affordability",
            self.balance
                .check_affordability(payer_id, estimated_units, rate_per_unit)
                .await,
        )
    }

    /// Re-issue credentials for a party of an active session.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `AlreadyEnded` or `PermissionDenied`.
    pub async fn refresh_credentials(
        &self,
        session_id: SessionId,
        account_id: &str,
    ) -> Result<CredentialSet, BillingError> {
        observe(
            "refresh_credentials",
            self.registry
                .refresh_credentials(session_id, account_id.to_string())
                .await,
        )
    }

    /// Verify a token minted by this engine.
    ///
    /// # Errors
    ///
    /// Returns the `TokenError` describing why the token was rejected.
    pub fn verify_credential(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.issuer.verify(token)
    }

    /// Settle a virtual gift bought for `provider_id`.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` unless `price` is a positive amount in whole cents.
    #[instrument(skip_all, name = "billing.engine.settle_gift", fields(provider_id = %provider_id))]
    pub async fn settle_gift(
        &self,
        provider_id: &str,
        price: Decimal,
    ) -> Result<SettlementSplit, BillingError> {
        let result = async {
            ensure_currency_amount(price)?;
            if price.is_zero() {
                return Err(BillingError::InvalidAmount(
                    "gift price must be positive".to_string(),
                ));
            }

            let settlement = split(price, &self.commission)?;
            self.earnings
                .credit(&format!("gift:{}", Uuid::new_v4()), provider_id, &settlement)
                .await;
            Ok(settlement)
        }
        .await;

        observe("settle_gift", result)
    }

    /// Register the payment-rail account that receives a provider's payouts.
    pub async fn register_payout_destination(&self, provider_id: &str, destination_account: &str) {
        self.earnings
            .register_destination(provider_id, destination_account)
            .await;
    }

    pub async fn provider_earnings(&self, provider_id: &str) -> Option<ProviderEarnings> {
        self.earnings.provider(provider_id).await
    }

    pub async fn platform_revenue(&self) -> Decimal {
        self.earnings.platform_revenue().await
    }

    /// Pay out one provider directly, outside the earnings ledger.
    pub async fn run_daily_payout(
        &self,
        provider_id: &str,
        pending_amount: Decimal,
        destination_account: &str,
    ) -> PayoutOutcome {
        self.payouts
            .run_daily_payout(provider_id, pending_amount, destination_account)
            .await
    }

    /// Run one payout cycle over every provider with pending earnings.
    pub async fn run_payouts(&self) -> PayoutBatchReport {
        run_payout_cycle(&self.payouts, &self.earnings).await
    }

    /// Evict expired terminal sessions now.
    ///
    /// # Errors
    ///
    /// `Internal` if the registry has shut down.
    pub async fn sweep_expired(&self) -> Result<SweepReport, BillingError> {
        self.registry.sweep(self.retention.retention_window()).await
    }

    /// Registry counters.
    ///
    /// # Errors
    ///
    /// `Internal` if the registry has shut down.
    pub async fn status(&self) -> Result<RegistryStatus, BillingError> {
        self.registry.get_status().await
    }

    /// Spawn the retention sweeper and the payout task.
    pub async fn spawn_background_tasks(&self) {
        let sweeper = tokio::spawn(start_retention_sweeper(
            self.registry.clone(),
            self.retention.clone(),
            self.cancel_token.child_token(),
        ));
        let payouts = tokio::spawn(start_payout_task(
            Arc::clone(&self.payouts),
            Arc::clone(&self.earnings),
            self.payout_interval,
            self.cancel_token.child_token(),
        ));

        self.tasks.lock().await.extend([sweeper, payouts]);
    }

    /// Stop every timer and background task and wait for them to exit.
    ///
    /// Active sessions are left unfinalized.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(
                    target: "billing.engine",
                    error = ?e,
                    "Engine task ended abnormally"
                );
            }
        }

        info!(target: "billing.engine", "Billing engine stopped");
    }
}

impl std::fmt::Debug for BillingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingEngine")
            .field("commission", &self.commission)
            .field("rate_card", &self.rate_card)
            .field("min_start_units", &self.min_start_units)
            .finish_non_exhaustive()
    }
}

/// Split a finalized session and credit its provider.
///
/// Idempotent per session: the credit key is `session:{id}`, so settling an
/// already-finalized session only credits if no earlier settle did.
async fn settle_session(
    earnings: &EarningsLedger,
    commission: &CommissionPolicy,
    outcome: FinalizeOutcome,
) -> Result<FinalizedSession, BillingError> {
    let already_finalized = !outcome.is_first();
    let session = outcome.into_session();

    let final_cost = session.final_cost.ok_or_else(|| {
        BillingError::Internal(format!("finalized session {} has no final cost", session.id))
    })?;
    let settlement = split(final_cost, commission)?;

    let credited = match session.status {
        SessionStatus::Completed | SessionStatus::Cancelled => {
            let credited = earnings
                .credit(
                    &format!("session:{}", session.id),
                    &session.provider_id,
                    &settlement,
                )
                .await;
            if credited && already_finalized {
                warn!(
                    target: "billing.engine",
                    session_id = %session.id,
                    final_cost = %final_cost,
                    "Credited a finalized session that was missing its settlement"
                );
            }
            credited
        }
        SessionStatus::Disputed | SessionStatus::Active => {
            if !already_finalized {
                info!(
                    target: "billing.engine",
                    session_id = %session.id,
                    final_cost = %final_cost,
                    "Disputed session settled without provider credit"
                );
            }
            false
        }
    };

    Ok(FinalizedSession {
        session,
        settlement: Some(settlement),
        credited,
        already_finalized,
    })
}

/// Count errors by operation and bounded error type.
fn observe<T>(operation: &str, result: Result<T, BillingError>) -> Result<T, BillingError> {
    if let Err(e) = &result {
        billing_metrics::record_error(operation, e.error_type_label());
    }
    result
}
