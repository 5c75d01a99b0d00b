//! Revenue split between the platform and the service provider.
//!
//! Both shares are rounded to the smallest currency unit (cents) with
//! midpoint-away-from-zero rounding. Whatever residual cent the two roundings
//! leave is assigned to the platform share, so
//! `platform_fee + provider_earnings == total` holds exactly.

use crate::errors::BillingError;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

/// Number of fractional digits in the smallest currency unit.
pub const CURRENCY_SCALE: u32 = 2;

/// Platform commission share used when none is configured.
pub const DEFAULT_PLATFORM_RATE: Decimal = dec!(0.30);

/// Provider share used when none is configured.
pub const DEFAULT_PROVIDER_RATE: Decimal = dec!(0.70);

/// Commission policy: how a settled amount is divided.
///
/// Only constructible through [`CommissionPolicy::new`], which enforces
/// `platform_rate + provider_rate == 1.0` with both rates in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionPolicy {
    platform_rate: Decimal,
    provider_rate: Decimal,
}

impl CommissionPolicy {
    /// Build a validated policy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCommissionPolicy` if either rate is outside `[0, 1]`
    /// or the rates do not sum to exactly 1.0.
    pub fn new(platform_rate: Decimal, provider_rate: Decimal) -> Result<Self, BillingError> {
        let in_range = |rate: Decimal| rate >= Decimal::ZERO && rate <= Decimal::ONE;

        if !in_range(platform_rate) || !in_range(provider_rate) {
            return Err(BillingError::InvalidCommissionPolicy(format!(
                "rates must be between 0 and 1 (platform {platform_rate}, provider {provider_rate})"
            )));
        }

        if platform_rate + provider_rate != Decimal::ONE {
            return Err(BillingError::InvalidCommissionPolicy(format!(
                "rates must sum to 1.0 (platform {platform_rate} + provider {provider_rate})"
            )));
        }

        Ok(Self {
            platform_rate,
            provider_rate,
        })
    }

    /// Platform commission rate.
    #[must_use]
    pub fn platform_rate(&self) -> Decimal {
        self.platform_rate
    }

    /// Provider share rate.
    #[must_use]
    pub fn provider_rate(&self) -> Decimal {
        self.provider_rate
    }
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self {
            platform_rate: DEFAULT_PLATFORM_RATE,
            provider_rate: DEFAULT_PROVIDER_RATE,
        }
    }
}

/// Result of splitting a settled amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettlementSplit {
    /// Amount that was split.
    pub total: Decimal,
    /// Platform commission (absorbs the rounding residual).
    pub platform_fee: Decimal,
    /// Amount owed to the provider.
    pub provider_earnings: Decimal,
}

/// Split `total` between platform and provider under `policy`.
///
/// # Errors
///
/// Returns `InvalidAmount` if `total` is negative, has sub-cent precision,
/// or the multiplication overflows.
pub fn split(total: Decimal, policy: &CommissionPolicy) -> Result<SettlementSplit, BillingError> {
    ensure_currency_amount(total)?;

    let platform_share = round_to_currency(
        total
            .checked_mul(policy.platform_rate)
            .ok_or_else(|| BillingError::InvalidAmount(format!("{total} overflows")))?,
    );
    let provider_earnings = round_to_currency(
        total
            .checked_mul(policy.provider_rate)
            .ok_or_else(|| BillingError::InvalidAmount(format!("{total} overflows")))?,
    );

    // Each rounding moves a share by at most half a cent, so the residual is
    // at most one cent either way. The platform absorbs it.
    let residual = total - platform_share - provider_earnings;
    let platform_fee = platform_share + residual;

    Ok(SettlementSplit {
        total,
        platform_fee,
        provider_earnings,
    })
}

/// Round an amount to whole cents (midpoint away from zero).
#[must_use]
pub fn round_to_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Ensure an amount is non-negative and expressible in whole cents.
///
/// # Errors
///
/// Returns `InvalidAmount` otherwise.
pub fn ensure_currency_amount(amount: Decimal) -> Result<(), BillingError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(BillingError::InvalidAmount(format!(
            "{amount} is negative"
        )));
    }
    if amount.normalize().scale() > CURRENCY_SCALE {
        return Err(BillingError::InvalidAmount(format!(
            "{amount} has sub-cent precision"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn policy(platform: Decimal, provider: Decimal) -> CommissionPolicy {
        CommissionPolicy::new(platform, provider).expect("valid policy")
    }

    #[test]
    fn test_thirty_seventy_split_of_ten() {
        let result = split(dec!(10.00), &policy(dec!(0.30), dec!(0.70))).unwrap();

        assert_eq!(result.platform_fee, dec!(3.00));
        assert_eq!(result.provider_earnings, dec!(7.00));
        assert_eq!(result.platform_fee + result.provider_earnings, dec!(10.00));
    }

    #[test]
    fn test_residual_cent_goes_to_platform() {
        // 0.01 * 0.5 = 0.005 rounds up on both sides, leaving -0.01 residual.
        let result = split(dec!(0.01), &policy(dec!(0.5), dec!(0.5))).unwrap();
        assert_eq!(result.provider_earnings, dec!(0.01));
        assert_eq!(result.platform_fee, dec!(0.00));

        // 0.05 * 0.333 / 0.667: 0.01665 -> 0.02, 0.03335 -> 0.03
        let result = split(dec!(0.05), &policy(dec!(0.333), dec!(0.667))).unwrap();
        assert_eq!(result.platform_fee + result.provider_earnings, dec!(0.05));
    }

    #[test]
    fn test_zero_total_splits_to_zero() {
        let result = split(Decimal::ZERO, &CommissionPolicy::default()).unwrap();
        assert_eq!(result.platform_fee, Decimal::ZERO);
        assert_eq!(result.provider_earnings, Decimal::ZERO);
    }

    #[test]
    fn test_split_sums_exactly_across_practical_range() {
        let policies = [
            policy(dec!(0.30), dec!(0.70)),
            policy(dec!(0.25), dec!(0.75)),
            policy(dec!(0.333), dec!(0.667)),
            policy(dec!(0.15), dec!(0.85)),
            policy(dec!(0.5), dec!(0.5)),
            policy(Decimal::ZERO, Decimal::ONE),
            policy(Decimal::ONE, Decimal::ZERO),
        ];

        // Every cent up to 100.00, then coarser steps up to 100,000.00.
        let fine = (0..=10_000_i64).map(|cents| Decimal::new(cents, 2));
        let coarse = (0..=100_000_i64)
            .step_by(97)
            .map(|units| Decimal::new(units * 100 + 37, 2));

        for total in fine.chain(coarse) {
            for p in &policies {
                let result = split(total, p).unwrap();
                assert_eq!(
                    result.platform_fee + result.provider_earnings,
                    total,
                    "split of {total} under {p:?} does not sum"
                );
                assert!(result.platform_fee >= Decimal::ZERO);
                assert!(result.provider_earnings >= Decimal::ZERO);
                assert!(result.platform_fee.normalize().scale() <= CURRENCY_SCALE);
            }
        }
    }

    #[test]
    fn test_split_rejects_negative_and_sub_cent_totals() {
        let p = CommissionPolicy::default();
        assert!(matches!(
            split(dec!(-1.00), &p),
            Err(BillingError::InvalidAmount(_))
        ));
        assert!(matches!(
            split(dec!(1.005), &p),
            Err(BillingError::InvalidAmount(_))
        ));
        // Trailing zeros are not sub-cent precision.
        assert!(split(dec!(1.5000), &p).is_ok());
    }

    #[test]
    fn test_policy_must_sum_to_one() {
        assert!(matches!(
            CommissionPolicy::new(dec!(0.30), dec!(0.60)),
            Err(BillingError::InvalidCommissionPolicy(_))
        ));
        assert!(matches!(
            CommissionPolicy::new(dec!(1.20), dec!(-0.20)),
            Err(BillingError::InvalidCommissionPolicy(_))
        ));
        assert!(CommissionPolicy::new(dec!(0.3), dec!(0.7)).is_ok());
    }

    #[test]
    fn test_default_policy_is_thirty_seventy() {
        let p = CommissionPolicy::default();
        assert_eq!(p.platform_rate(), dec!(0.30));
        assert_eq!(p.provider_rate(), dec!(0.70));
    }
}
