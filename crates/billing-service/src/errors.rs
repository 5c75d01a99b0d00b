//! Billing engine error types.
//!
//! Error types map to HTTP-style status codes so the surrounding application
//! can surface them without inspecting variants. Internal details are logged
//! server-side but never returned by [`BillingError::client_message`].

use rust_decimal::Decimal;
use thiserror::Error;

/// Billing engine error type.
///
/// Status code mapping:
/// - Validation (`InvalidRate`, `InvalidAmount`, `InvalidChannelName`): 400
/// - `InsufficientBalance`: 402
/// - `PermissionDenied`: 403
/// - `SessionNotFound`: 404
/// - `AlreadyEnded`: 409
/// - `AffordabilityCheckFailed`: 502 (ledger collaborator failure)
/// - `InvalidCommissionPolicy`, `Config`, `Internal`: 500
#[derive(Debug, Error)]
pub enum BillingError {
    /// No session with this ID in the live table.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session already reached a terminal status.
    #[error("Session already ended: {0}")]
    AlreadyEnded(String),

    /// Channel name does not match `^[A-Za-z0-9_]{1,64}$`.
    #[error("Invalid channel name: {0}")]
    InvalidChannelName(String),

    /// Commission rates are out of range or do not sum to 1.0.
    #[error("Invalid commission policy: {0}")]
    InvalidCommissionPolicy(String),

    /// Rate per unit is not a positive amount in whole cents.
    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    /// Monetary amount is negative, sub-cent or overflowed.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Ledger balance could not be read.
    #[error("Affordability check failed: {0}")]
    AffordabilityCheckFailed(String),

    /// Payer balance does not cover the minimum billable usage.
    #[error("Insufficient balance: {current_balance} available, {estimated_cost} required")]
    InsufficientBalance {
        current_balance: Decimal,
        estimated_cost: Decimal,
    },

    /// Caller is not a party to the session.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Returns the HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            BillingError::InvalidRate(_)
            | BillingError::InvalidAmount(_)
            | BillingError::InvalidChannelName(_) => 400,
            BillingError::InsufficientBalance { .. } => 402,
            BillingError::PermissionDenied(_) => 403,
            BillingError::SessionNotFound(_) => 404,
            BillingError::AlreadyEnded(_) => 409,
            BillingError::AffordabilityCheckFailed(_) => 502,
            BillingError::InvalidCommissionPolicy(_)
            | BillingError::Config(_)
            | BillingError::Internal(_) => 500,
        }
    }

    /// Returns a bounded label string for the error variant (for metrics).
    ///
    /// Uses variant names, never message content, to keep label cardinality bounded.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            BillingError::SessionNotFound(_) => "session_not_found",
            BillingError::AlreadyEnded(_) => "already_ended",
            BillingError::InvalidChannelName(_) => "invalid_channel_name",
            BillingError::InvalidCommissionPolicy(_) => "invalid_commission_policy",
            BillingError::InvalidRate(_) => "invalid_rate",
            BillingError::InvalidAmount(_) => "invalid_amount",
            BillingError::AffordabilityCheckFailed(_) => "affordability_check_failed",
            BillingError::InsufficientBalance { .. } => "insufficient_balance",
            BillingError::PermissionDenied(_) => "permission_denied",
            BillingError::Config(_) => "config",
            BillingError::Internal(_) => "internal",
        }
    }

    /// Returns a client-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            BillingError::InvalidCommissionPolicy(_)
            | BillingError::Config(_)
            | BillingError::Internal(_) => "An internal error occurred".to_string(),
            BillingError::AffordabilityCheckFailed(_) => {
                "Unable to verify balance, please try again".to_string()
            }
            BillingError::SessionNotFound(_) => "Session not found".to_string(),
            BillingError::AlreadyEnded(_) => "Session has already ended".to_string(),
            BillingError::InsufficientBalance { estimated_cost, .. } => {
                format!("Insufficient balance: at least {estimated_cost} is required to start")
            }
            BillingError::InvalidChannelName(msg)
            | BillingError::InvalidRate(msg)
            | BillingError::InvalidAmount(msg)
            | BillingError::PermissionDenied(msg) => msg.clone(),
        }
    }
}
