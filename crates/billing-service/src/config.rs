//! Billing engine configuration.
//!
//! Configuration is loaded from environment variables. The token signing
//! certificate is redacted in Debug output.

use crate::session::rate_card::{
    RateCard, DEFAULT_TEXT_RATE, DEFAULT_VIDEO_RATE, DEFAULT_VOICE_RATE,
};
use crate::settlement::splitter::{
    CommissionPolicy, CURRENCY_SCALE, DEFAULT_PLATFORM_RATE, DEFAULT_PROVIDER_RATE,
};

use common::secret::{ExposeSecret, SecretString};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Minimum length of the token signing certificate in bytes.
pub const MIN_CERTIFICATE_LENGTH: usize = 32;

/// Default minimum payout threshold.
pub const DEFAULT_MINIMUM_PAYOUT: Decimal = dec!(15.00);

/// Default billing unit length in seconds.
pub const DEFAULT_UNIT_SECONDS: u64 = 60;

/// Default credential lifetime in seconds.
pub const DEFAULT_CREDENTIAL_TTL_SECONDS: u64 = 3600;

/// Default number of billing units a payer must afford to start a session.
pub const DEFAULT_MIN_START_UNITS: u64 = 1;

/// Default retention of terminal sessions in seconds (24 hours).
pub const DEFAULT_RETENTION_WINDOW_SECONDS: u64 = 86_400;

/// Default retention sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;

/// Default payout batch interval in seconds (daily).
pub const DEFAULT_PAYOUT_INTERVAL_SECONDS: u64 = 86_400;

/// Default payout currency.
pub const DEFAULT_PAYOUT_CURRENCY: &str = "usd";

/// Billing engine configuration.
#[derive(Clone)]
pub struct Config {
    /// Media/messaging provider application id.
    pub token_app_id: String,

    /// Application certificate used to sign credentials.
    /// Protected by `SecretString` to prevent accidental logging.
    pub token_app_certificate: SecretString,

    /// Platform/provider revenue split (default 0.30 / 0.70).
    pub commission: CommissionPolicy,

    /// Minimum pending earnings before a payout transfer is attempted.
    pub minimum_payout: Decimal,

    /// Per-kind rates used by card-rate starts (default 2.99 / 3.99 / 4.99).
    pub rate_card: RateCard,

    /// Billing unit length in seconds (default: 60).
    pub billing_unit_seconds: u64,

    /// Credential lifetime in seconds (default: 3600).
    pub credential_ttl_seconds: u64,

    /// Units the payer must be able to afford at start (default: 1).
    pub min_start_units: u64,

    /// How long terminal sessions stay queryable (default: 24h).
    pub retention_window_seconds: u64,

    /// Retention sweeper period (default: 300).
    pub sweep_interval_seconds: u64,

    /// Payout batch period (default: daily).
    pub payout_interval_seconds: u64,

    /// Currency code passed to the payment rail (default: "usd").
    pub payout_currency: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token_app_id", &self.token_app_id)
            .field("token_app_certificate", &"[REDACTED]")
            .field("commission", &self.commission)
            .field("minimum_payout", &self.minimum_payout)
            .field("rate_card", &self.rate_card)
            .field("billing_unit_seconds", &self.billing_unit_seconds)
            .field("credential_ttl_seconds", &self.credential_ttl_seconds)
            .field("min_start_units", &self.min_start_units)
            .field("retention_window_seconds", &self.retention_window_seconds)
            .field("sweep_interval_seconds", &self.sweep_interval_seconds)
            .field("payout_interval_seconds", &self.payout_interval_seconds)
            .field("payout_currency", &self.payout_currency)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `MissingEnvVar` for absent required variables and
    /// `InvalidValue` for malformed amounts, a short certificate, a zero
    /// billing unit or commission rates that do not sum to 1.0.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let token_app_id = vars
            .get("BILLING_TOKEN_APP_ID")
            .ok_or_else(|| ConfigError::MissingEnvVar("BILLING_TOKEN_APP_ID".to_string()))?
            .clone();

        if token_app_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "BILLING_TOKEN_APP_ID must not be empty".to_string(),
            ));
        }

        let token_app_certificate = SecretString::from(
            vars.get("BILLING_TOKEN_APP_CERTIFICATE")
                .ok_or_else(|| {
                    ConfigError::MissingEnvVar("BILLING_TOKEN_APP_CERTIFICATE".to_string())
                })?
                .clone(),
        );

        if token_app_certificate.expose_secret().len() < MIN_CERTIFICATE_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "BILLING_TOKEN_APP_CERTIFICATE must be at least {MIN_CERTIFICATE_LENGTH} bytes"
            )));
        }

        // Amounts are parsed strictly. Malformed values never fall back to defaults.
        let platform_rate = parse_decimal(vars, "BILLING_PLATFORM_RATE", DEFAULT_PLATFORM_RATE)?;
        let provider_rate = parse_decimal(vars, "BILLING_PROVIDER_RATE", DEFAULT_PROVIDER_RATE)?;
        let commission = CommissionPolicy::new(platform_rate, provider_rate)
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let minimum_payout =
            parse_decimal(vars, "BILLING_MINIMUM_PAYOUT", DEFAULT_MINIMUM_PAYOUT)?;
        if minimum_payout.is_sign_negative() || minimum_payout.normalize().scale() > CURRENCY_SCALE
        {
            return Err(ConfigError::InvalidValue(format!(
                "BILLING_MINIMUM_PAYOUT must be a non-negative amount in whole cents, got {minimum_payout}"
            )));
        }

        let rate_card = RateCard::new(
            parse_decimal(vars, "BILLING_RATE_TEXT", DEFAULT_TEXT_RATE)?,
            parse_decimal(vars, "BILLING_RATE_VOICE", DEFAULT_VOICE_RATE)?,
            parse_decimal(vars, "BILLING_RATE_VIDEO", DEFAULT_VIDEO_RATE)?,
        )
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let billing_unit_seconds = vars
            .get("BILLING_UNIT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_UNIT_SECONDS);

        if billing_unit_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "BILLING_UNIT_SECONDS must be greater than zero".to_string(),
            ));
        }

        let credential_ttl_seconds = vars
            .get("BILLING_CREDENTIAL_TTL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CREDENTIAL_TTL_SECONDS);

        let min_start_units = vars
            .get("BILLING_MIN_START_UNITS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MIN_START_UNITS);

        let retention_window_seconds = vars
            .get("BILLING_RETENTION_WINDOW_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RETENTION_WINDOW_SECONDS);

        let sweep_interval_seconds = vars
            .get("BILLING_SWEEP_INTERVAL_SECONDS")
            .and_then(|s| s.parse().ok())
            .filter(|&secs: &u64| secs > 0)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECONDS);

        let payout_interval_seconds = vars
            .get("BILLING_PAYOUT_INTERVAL_SECONDS")
            .and_then(|s| s.parse().ok())
            .filter(|&secs: &u64| secs > 0)
            .unwrap_or(DEFAULT_PAYOUT_INTERVAL_SECONDS);

        let payout_currency = vars
            .get("BILLING_PAYOUT_CURRENCY")
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_PAYOUT_CURRENCY.to_string());

        Ok(Config {
            token_app_id,
            token_app_certificate,
            commission,
            minimum_payout,
            rate_card,
            billing_unit_seconds,
            credential_ttl_seconds,
            min_start_units,
            retention_window_seconds,
            sweep_interval_seconds,
            payout_interval_seconds,
            payout_currency,
        })
    }

    /// Billing unit as a `Duration`.
    #[must_use]
    pub fn billing_unit(&self) -> Duration {
        Duration::from_secs(self.billing_unit_seconds)
    }

    /// Credential lifetime as a `Duration`.
    #[must_use]
    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.credential_ttl_seconds)
    }

    /// Retention window as a `Duration`.
    #[must_use]
    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention_window_seconds)
    }
}

fn parse_decimal(
    vars: &HashMap<String, String>,
    name: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    match vars.get(name) {
        Some(raw) => Decimal::from_str(raw.trim())
            .map_err(|e| ConfigError::InvalidValue(format!("{name}: {e}"))),
        None => Ok(default),
    }
}
