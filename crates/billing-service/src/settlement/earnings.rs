//! In-memory provider earnings ledger.
//!
//! Settled provider shares accumulate here as pending payout until the payout
//! task moves them to the provider's destination account. Every credit carries
//! a settlement key and a key is only ever applied once.

use crate::errors::BillingError;
use crate::payout::PayoutRequest;
use crate::settlement::splitter::SettlementSplit;

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Earnings position of one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderEarnings {
    pub provider_id: String,
    /// Lifetime provider share credited.
    pub total_earned: Decimal,
    /// Credited but not yet transferred.
    pub pending_payout: Decimal,
    /// Lifetime amount transferred.
    pub total_paid: Decimal,
    /// Connected payment-rail account, if registered.
    pub destination_account: Option<String>,
}

impl ProviderEarnings {
    fn new(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            total_earned: Decimal::ZERO,
            pending_payout: Decimal::ZERO,
            total_paid: Decimal::ZERO,
            destination_account: None,
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    providers: HashMap<String, ProviderEarnings>,
    platform_revenue: Decimal,
    settled_keys: HashSet<String>,
}

/// Provider earnings and platform revenue.
#[derive(Debug, Default)]
pub struct EarningsLedger {
    state: RwLock<LedgerState>,
}

impl EarningsLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a settlement to `provider_id`.
    ///
    /// Returns `false` without changing anything if `settlement_key` was
    /// already credited.
    pub async fn credit(
        &self,
        settlement_key: &str,
        provider_id: &str,
        split: &SettlementSplit,
    ) -> bool {
        let mut state = self.state.write().await;

        if !state.settled_keys.insert(settlement_key.to_string()) {
            debug!(
                target: "billing.earnings",
                settlement_key = %settlement_key,
                "Settlement already credited, skipping"
            );
            return false;
        }

        state.platform_revenue += split.platform_fee;

        let entry = state
            .providers
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderEarnings::new(provider_id));
        entry.total_earned += split.provider_earnings;
        entry.pending_payout += split.provider_earnings;

        debug!(
            target: "billing.earnings",
            settlement_key = %settlement_key,
            provider_id = %provider_id,
            provider_earnings = %split.provider_earnings,
            platform_fee = %split.platform_fee,
            pending_payout = %entry.pending_payout,
            "Settlement credited"
        );

        true
    }

    /// Register or replace the payout destination for a provider.
    pub async fn register_destination(&self, provider_id: &str, destination_account: &str) {
        let mut state = self.state.write().await;
        state
            .providers
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderEarnings::new(provider_id))
            .destination_account = Some(destination_account.to_string());
    }

    /// Earnings position of a provider, if any settlement or destination
    /// has been recorded.
    pub async fn provider(&self, provider_id: &str) -> Option<ProviderEarnings> {
        self.state.read().await.providers.get(provider_id).cloned()
    }

    /// Total platform commission credited.
    pub async fn platform_revenue(&self) -> Decimal {
        self.state.read().await.platform_revenue
    }

    /// Payout requests for every provider with a destination and a positive
    /// pending balance. Threshold checks are left to the payout scheduler.
    pub async fn payable(&self) -> Vec<PayoutRequest> {
        let state = self.state.read().await;
        let mut requests: Vec<PayoutRequest> = state
            .providers
            .values()
            .filter(|p| p.pending_payout > Decimal::ZERO)
            .filter_map(|p| {
                p.destination_account.as_ref().map(|destination| PayoutRequest {
                    provider_id: p.provider_id.clone(),
                    pending_amount: p.pending_payout,
                    destination_account: destination.clone(),
                })
            })
            .collect();
        requests.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        requests
    }

    /// Move `amount` from pending to paid after a successful transfer.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` if the provider is unknown or `amount` exceeds the
    /// pending balance.
    pub async fn mark_paid(&self, provider_id: &str, amount: Decimal) -> Result<(), BillingError> {
        let mut state = self.state.write().await;
        let entry = state.providers.get_mut(provider_id).ok_or_else(|| {
            BillingError::InvalidAmount(format!("no earnings recorded for {provider_id}"))
        })?;

        if amount.is_sign_negative() || amount > entry.pending_payout {
            return Err(BillingError::InvalidAmount(format!(
                "cannot mark {amount} paid, {} pending",
                entry.pending_payout
            )));
        }

        entry.pending_payout -= amount;
        entry.total_paid += amount;

        info!(
            target: "billing.earnings",
            provider_id = %provider_id,
            amount = %amount,
            pending_payout = %entry.pending_payout,
            "Payout recorded"
        );

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::settlement::splitter::{split, CommissionPolicy};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_credit_is_applied_once_per_key() {
        let ledger = EarningsLedger::new();
        let s = split(dec!(10.00), &CommissionPolicy::default()).unwrap();

        assert!(ledger.credit("session:1", "reader-1", &s).await);
        assert!(!ledger.credit("session:1", "reader-1", &s).await);

        let earnings = ledger.provider("reader-1").await.unwrap();
        assert_eq!(earnings.total_earned, dec!(7.00));
        assert_eq!(earnings.pending_payout, dec!(7.00));
        assert_eq!(ledger.platform_revenue().await, dec!(3.00));
    }

    #[tokio::test]
    async fn test_payable_requires_destination_and_balance() {
        let ledger = EarningsLedger::new();
        let s = split(dec!(30.00), &CommissionPolicy::default()).unwrap();

        ledger.credit("session:a", "reader-a", &s).await;
        ledger.credit("session:b", "reader-b", &s).await;
        ledger.register_destination("reader-b", "acct_b").await;
        ledger.register_destination("reader-c", "acct_c").await;

        let payable = ledger.payable().await;
        assert_eq!(
            payable,
            vec![PayoutRequest {
                provider_id: "reader-b".to_string(),
                pending_amount: dec!(21.00),
                destination_account: "acct_b".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_mark_paid_moves_pending_to_paid() {
        let ledger = EarningsLedger::new();
        let s = split(dec!(30.00), &CommissionPolicy::default()).unwrap();
        ledger.credit("session:a", "reader-a", &s).await;

        ledger.mark_paid("reader-a", dec!(21.00)).await.unwrap();

        let earnings = ledger.provider("reader-a").await.unwrap();
        assert_eq!(earnings.pending_payout, Decimal::ZERO);
        assert_eq!(earnings.total_paid, dec!(21.00));
        assert_eq!(earnings.total_earned, dec!(21.00));
    }

    #[tokio::test]
    async fn test_mark_paid_rejects_overpayment() {
        let ledger = EarningsLedger::new();
        let s = split(dec!(10.00), &CommissionPolicy::default()).unwrap();
        ledger.credit("session:a", "reader-a", &s).await;

        assert!(matches!(
            ledger.mark_paid("reader-a", dec!(7.01)).await,
            Err(BillingError::InvalidAmount(_))
        ));
        assert!(ledger.mark_paid("nobody", dec!(1.00)).await.is_err());
    }
}
