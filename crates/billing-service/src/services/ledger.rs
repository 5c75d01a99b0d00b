//! Ledger collaborator: read access to account balances.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),
}

/// Source of payer balances.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current spendable balance of `account_id`.
    async fn balance(&self, account_id: &str) -> Result<Decimal, LedgerError>;
}

/// Mock ledger module for testing.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// In-memory ledger with settable balances.
    #[derive(Debug, Default)]
    pub struct MockLedger {
        balances: Mutex<HashMap<String, Decimal>>,
        call_count: AtomicUsize,
        return_error: bool,
    }

    impl MockLedger {
        /// Ledger with no accounts; unknown accounts read as `AccountNotFound`.
        pub fn new() -> Self {
            Self::default()
        }

        /// Ledger holding a single account.
        pub fn with_balance(account_id: &str, balance: Decimal) -> Self {
            let ledger = Self::new();
            ledger.set_balance(account_id, balance);
            ledger
        }

        /// Ledger whose every read fails as unavailable.
        pub fn failing() -> Self {
            Self {
                return_error: true,
                ..Self::default()
            }
        }

        pub fn set_balance(&self, account_id: &str, balance: Decimal) {
            self.balances
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(account_id.to_string(), balance);
        }

        /// Get the number of balance reads made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl LedgerStore for MockLedger {
        async fn balance(&self, account_id: &str) -> Result<Decimal, LedgerError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            if self.return_error {
                return Err(LedgerError::Unavailable("Mock ledger error".to_string()));
            }

            self.balances
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(account_id)
                .copied()
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::mock::MockLedger;
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_ledger_reads_balances() {
        let ledger = MockLedger::with_balance("client-1", dec!(25.00));

        assert_eq!(ledger.balance("client-1").await.unwrap(), dec!(25.00));
        assert!(matches!(
            ledger.balance("client-2").await,
            Err(LedgerError::AccountNotFound(_))
        ));
        assert_eq!(ledger.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_ledger() {
        let ledger = MockLedger::failing();
        assert!(matches!(
            ledger.balance("client-1").await,
            Err(LedgerError::Unavailable(_))
        ));
    }
}
