//! Payment rail collaborator: customers, deposits, transfers and refunds.
//!
//! Amounts cross this boundary in minor currency units (cents) as `i64`,
//! the representation card and transfer APIs expect.

use crate::errors::BillingError;
use crate::settlement::splitter::CURRENCY_SCALE;

use common::secret::SecretString;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RailError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment rail unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid payment request: {0}")]
    InvalidRequest(String),
}

/// Payment intent for a balance top-up.
#[derive(Debug, Clone)]
pub struct DepositIntent {
    pub reference: String,
    /// Handed to the paying client to confirm the payment.
    pub client_secret: SecretString,
    pub amount_minor: i64,
    pub currency: String,
}

/// Transfer of settled earnings to a connected account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub destination_account: String,
    pub amount_minor: i64,
    pub currency: String,
    /// Provider the transfer pays out; carried as transfer metadata.
    pub provider_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundReceipt {
    pub reference: String,
    pub amount_minor: i64,
}

/// Outbound payment provider.
#[async_trait::async_trait]
pub trait PaymentRail: Send + Sync {
    /// Create a customer record for `account_id`; returns the rail's customer reference.
    async fn create_customer(&self, account_id: &str, email: &str) -> Result<String, RailError>;

    /// Create a deposit intent charging `amount_minor` to a customer.
    async fn create_deposit_intent(
        &self,
        customer_reference: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<DepositIntent, RailError>;

    /// Transfer funds to a connected account.
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, RailError>;

    /// Refund a charge, fully when `amount_minor` is `None`.
    async fn refund(
        &self,
        charge_reference: &str,
        amount_minor: Option<i64>,
    ) -> Result<RefundReceipt, RailError>;
}

/// Convert a whole-cent amount to minor units.
///
/// # Errors
///
/// `InvalidAmount` for negative or sub-cent amounts, or values outside `i64`.
pub fn to_minor_units(amount: Decimal) -> Result<i64, BillingError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(BillingError::InvalidAmount(format!("{amount} is negative")));
    }
    if amount.normalize().scale() > CURRENCY_SCALE {
        return Err(BillingError::InvalidAmount(format!(
            "{amount} has sub-cent precision"
        )));
    }

    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| BillingError::InvalidAmount(format!("{amount} is out of range")))
}

/// Mock payment rail module for testing.
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// Payment rail that records transfers in memory.
    #[derive(Debug, Default)]
    pub struct MockPaymentRail {
        transfers: Mutex<Vec<TransferRequest>>,
        call_count: AtomicUsize,
        failing_destinations: HashSet<String>,
        return_error: bool,
    }

    impl MockPaymentRail {
        /// Rail that accepts every request.
        pub fn accepting() -> Self {
            Self::default()
        }

        /// Rail that fails every request as unavailable.
        pub fn failing() -> Self {
            Self {
                return_error: true,
                ..Self::default()
            }
        }

        /// Rail that declines transfers to the given destinations only.
        pub fn failing_for<I, S>(destinations: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                failing_destinations: destinations.into_iter().map(Into::into).collect(),
                ..Self::default()
            }
        }

        /// Get the number of calls made, across all operations.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Transfers accepted so far, in call order.
        pub fn transfers(&self) -> Vec<TransferRequest> {
            self.transfers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn next_call(&self) -> Result<usize, RailError> {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.return_error {
                return Err(RailError::Unavailable("Mock payment rail error".to_string()));
            }
            Ok(count)
        }
    }

    #[async_trait::async_trait]
    impl PaymentRail for MockPaymentRail {
        async fn create_customer(
            &self,
            account_id: &str,
            _email: &str,
        ) -> Result<String, RailError> {
            self.next_call()?;
            Ok(format!("cus_mock_{account_id}"))
        }

        async fn create_deposit_intent(
            &self,
            customer_reference: &str,
            amount_minor: i64,
            currency: &str,
        ) -> Result<DepositIntent, RailError> {
            let count = self.next_call()?;
            if amount_minor <= 0 {
                return Err(RailError::InvalidRequest(
                    "amount must be positive".to_string(),
                ));
            }
            Ok(DepositIntent {
                reference: format!("pi_mock_{count}"),
                client_secret: SecretString::from(format!(
                    "pi_mock_{count}_secret_{customer_reference}"
                )),
                amount_minor,
                currency: currency.to_string(),
            })
        }

        async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, RailError> {
            let count = self.next_call()?;
            if self.failing_destinations.contains(&request.destination_account) {
                return Err(RailError::Declined(format!(
                    "destination {} cannot receive transfers",
                    request.destination_account
                )));
            }
            self.transfers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());
            Ok(TransferReceipt {
                reference: format!("tr_mock_{count}"),
            })
        }

        async fn refund(
            &self,
            charge_reference: &str,
            amount_minor: Option<i64>,
        ) -> Result<RefundReceipt, RailError> {
            let count = self.next_call()?;
            Ok(RefundReceipt {
                reference: format!("re_mock_{count}_{charge_reference}"),
                amount_minor: amount_minor.unwrap_or(0),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::mock::MockPaymentRail;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(to_minor_units(dec!(15.00)).unwrap(), 1500);
        assert_eq!(to_minor_units(dec!(0.07)).unwrap(), 7);
        assert_eq!(to_minor_units(Decimal::ZERO).unwrap(), 0);
        assert_eq!(to_minor_units(dec!(11.96)).unwrap(), 1196);
        assert!(to_minor_units(dec!(1.005)).is_err());
        assert!(to_minor_units(dec!(-1.00)).is_err());
    }

    #[tokio::test]
    async fn test_mock_rail_records_transfers() {
        let rail = MockPaymentRail::accepting();
        let request = TransferRequest {
            destination_account: "acct_1".to_string(),
            amount_minor: 2100,
            currency: "usd".to_string(),
            provider_id: "reader-1".to_string(),
        };

        let receipt = rail.transfer(&request).await.unwrap();

        assert!(receipt.reference.starts_with("tr_mock_"));
        assert_eq!(rail.transfers(), vec![request]);
        assert_eq!(rail.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_rail_declines_selected_destinations() {
        let rail = MockPaymentRail::failing_for(["acct_bad"]);
        let request = TransferRequest {
            destination_account: "acct_bad".to_string(),
            amount_minor: 2100,
            currency: "usd".to_string(),
            provider_id: "reader-1".to_string(),
        };

        assert!(matches!(
            rail.transfer(&request).await,
            Err(RailError::Declined(_))
        ));
        assert!(rail.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_mock_rail_deposit_and_refund() {
        let rail = MockPaymentRail::accepting();

        let customer = rail.create_customer("client-1", "c@example.com").await.unwrap();
        let intent = rail
            .create_deposit_intent(&customer, 2500, "usd")
            .await
            .unwrap();
        assert_eq!(intent.amount_minor, 2500);

        let refund = rail.refund(&intent.reference, Some(500)).await.unwrap();
        assert_eq!(refund.amount_minor, 500);
        assert!(MockPaymentRail::failing()
            .create_customer("x", "y")
            .await
            .is_err());
    }
}
