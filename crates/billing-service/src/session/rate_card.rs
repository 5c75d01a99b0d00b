//! Per-kind default rates.

use crate::errors::BillingError;
use crate::session::model::SessionKind;
use crate::settlement::splitter::CURRENCY_SCALE;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Default per-minute rate for text sessions.
pub const DEFAULT_TEXT_RATE: Decimal = dec!(2.99);

/// Default per-minute rate for voice sessions.
pub const DEFAULT_VOICE_RATE: Decimal = dec!(3.99);

/// Default per-minute rate for video sessions.
pub const DEFAULT_VIDEO_RATE: Decimal = dec!(4.99);

/// Highest accepted rate per billing unit.
///
/// `u64::MAX` units at this rate stays below `Decimal::MAX`, so
/// [`cost_for_units`](crate::session::cost_for_units) cannot overflow for a
/// validated rate.
pub const MAX_RATE_PER_UNIT: Decimal = dec!(10_000.00);

/// A provider's advertised rate per billing unit for each session kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCard {
    text: Decimal,
    voice: Decimal,
    video: Decimal,
}

impl Default for RateCard {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT_RATE,
            voice: DEFAULT_VOICE_RATE,
            video: DEFAULT_VIDEO_RATE,
        }
    }
}

impl RateCard {
    /// Build a rate card, validating every rate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRate` if any rate is not a positive whole-cent amount.
    pub fn new(text: Decimal, voice: Decimal, video: Decimal) -> Result<Self, BillingError> {
        validate_rate(text)?;
        validate_rate(voice)?;
        validate_rate(video)?;
        Ok(Self { text, voice, video })
    }

    /// Rate for a session kind.
    #[must_use]
    pub fn rate_for(&self, kind: SessionKind) -> Decimal {
        match kind {
            SessionKind::Text => self.text,
            SessionKind::Voice => self.voice,
            SessionKind::Video => self.video,
        }
    }
}

/// Check that a rate is positive, at most [`MAX_RATE_PER_UNIT`] and has at
/// most two fractional digits.
///
/// # Errors
///
/// Returns `InvalidRate` otherwise.
pub fn validate_rate(rate: Decimal) -> Result<(), BillingError> {
    if rate <= Decimal::ZERO {
        return Err(BillingError::InvalidRate(format!(
            "rate must be positive, got {rate}"
        )));
    }
    if rate > MAX_RATE_PER_UNIT {
        return Err(BillingError::InvalidRate(format!(
            "rate must not exceed {MAX_RATE_PER_UNIT}, got {rate}"
        )));
    }
    if rate.normalize().scale() > CURRENCY_SCALE {
        return Err(BillingError::InvalidRate(format!(
            "rate must have at most {CURRENCY_SCALE} fractional digits, got {rate}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rates() {
        let card = RateCard::default();
        assert_eq!(card.rate_for(SessionKind::Text), dec!(2.99));
        assert_eq!(card.rate_for(SessionKind::Voice), dec!(3.99));
        assert_eq!(card.rate_for(SessionKind::Video), dec!(4.99));
    }

    #[test]
    fn test_rate_validation() {
        assert!(validate_rate(dec!(0.01)).is_ok());
        assert!(validate_rate(dec!(2.990)).is_ok());
        assert!(matches!(
            validate_rate(Decimal::ZERO),
            Err(BillingError::InvalidRate(_))
        ));
        assert!(validate_rate(dec!(-1.00)).is_err());
        assert!(validate_rate(dec!(2.999)).is_err());
        assert!(RateCard::new(dec!(1.00), dec!(0), dec!(1.00)).is_err());
    }

    #[test]
    fn test_rate_is_capped_so_cost_cannot_overflow() {
        assert!(validate_rate(MAX_RATE_PER_UNIT).is_ok());
        assert!(matches!(
            validate_rate(dec!(10_000.01)),
            Err(BillingError::InvalidRate(_))
        ));
        assert!(validate_rate(Decimal::MAX).is_err());

        let worst = crate::session::cost_for_units(u64::MAX, MAX_RATE_PER_UNIT);
        assert!(worst.is_ok());
    }
}
