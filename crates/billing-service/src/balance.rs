//! Payer affordability checks.
//!
//! The check is advisory and runs once, before a session starts. Running
//! sessions are never cut off for low balance.

use crate::errors::BillingError;
use crate::observability::metrics as billing_metrics;
use crate::services::LedgerStore;
use crate::session::cost_for_units;

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Result of an affordability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AffordabilityReport {
    pub sufficient: bool,
    pub current_balance: Decimal,
    pub estimated_cost: Decimal,
}

/// Reads payer balances from the ledger and compares them to estimated cost.
#[derive(Clone)]
pub struct BalanceGuard {
    ledger: Arc<dyn LedgerStore>,
}

impl BalanceGuard {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Whether `payer_id` can afford `estimated_units` at `rate_per_unit`.
    ///
    /// # Errors
    ///
    /// - `AffordabilityCheckFailed` if the ledger read fails
    /// - `InvalidAmount` if the estimate overflows
    #[instrument(skip_all, name = "billing.balance.check", fields(payer_id = %payer_id))]
    pub async fn check_affordability(
        &self,
        payer_id: &str,
        estimated_units: u64,
        rate_per_unit: Decimal,
    ) -> Result<AffordabilityReport, BillingError> {
        let started = Instant::now();
        let estimated_cost = cost_for_units(estimated_units, rate_per_unit)?;

        let current_balance = match self.ledger.balance(payer_id).await {
            Ok(balance) => balance,
            Err(e) => {
                billing_metrics::record_affordability_check("error", started.elapsed());
                warn!(
                    target: "billing.balance",
                    payer_id = %payer_id,
                    error = %e,
                    "Ledger balance read failed"
                );
                return Err(BillingError::AffordabilityCheckFailed(e.to_string()));
            }
        };

        let sufficient = current_balance >= estimated_cost;
        billing_metrics::record_affordability_check(
            if sufficient { "sufficient" } else { "insufficient" },
            started.elapsed(),
        );

        debug!(
            target: "billing.balance",
            payer_id = %payer_id,
            current_balance = %current_balance,
            estimated_cost = %estimated_cost,
            sufficient,
            "Affordability checked"
        );

        Ok(AffordabilityReport {
            sufficient,
            current_balance,
            estimated_cost,
        })
    }
}

impl std::fmt::Debug for BalanceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::ledger::mock::MockLedger;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_sufficient_balance() {
        let ledger = Arc::new(MockLedger::with_balance("client-1", dec!(20.00)));
        let guard = BalanceGuard::new(ledger.clone());

        let report = guard
            .check_affordability("client-1", 5, dec!(2.99))
            .await
            .unwrap();

        assert!(report.sufficient);
        assert_eq!(report.current_balance, dec!(20.00));
        assert_eq!(report.estimated_cost, dec!(14.95));
        assert_eq!(ledger.call_count(), 1);
    }

    #[tokio::test]
    async fn test_exact_balance_is_sufficient() {
        let guard = BalanceGuard::new(Arc::new(MockLedger::with_balance("client-1", dec!(2.99))));

        let report = guard
            .check_affordability("client-1", 1, dec!(2.99))
            .await
            .unwrap();

        assert!(report.sufficient);
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let guard = BalanceGuard::new(Arc::new(MockLedger::with_balance("client-1", dec!(1.50))));

        let report = guard
            .check_affordability("client-1", 1, dec!(2.99))
            .await
            .unwrap();

        assert!(!report.sufficient);
        assert_eq!(report.current_balance, dec!(1.50));
    }

    #[tokio::test]
    async fn test_ledger_failure_is_affordability_error() {
        let guard = BalanceGuard::new(Arc::new(MockLedger::failing()));

        let result = guard.check_affordability("client-1", 1, dec!(2.99)).await;

        assert!(matches!(
            result,
            Err(BillingError::AffordabilityCheckFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_account_is_affordability_error() {
        let guard = BalanceGuard::new(Arc::new(MockLedger::new()));

        assert!(matches!(
            guard.check_affordability("nobody", 1, dec!(1.00)).await,
            Err(BillingError::AffordabilityCheckFailed(_))
        ));
    }
}
