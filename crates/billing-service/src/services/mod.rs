//! External collaborators of the billing engine.
//!
//! Each collaborator is an async trait with an in-memory `mock` submodule
//! used by unit tests and by `billing-test-utils`.

pub mod ledger;
pub mod payment_rail;
pub mod webhook;

pub use ledger::{LedgerError, LedgerStore};
pub use payment_rail::{
    to_minor_units, DepositIntent, PaymentRail, RailError, RefundReceipt,
    TransferReceipt, TransferRequest,
};
pub use webhook::{sign_webhook_payload, verify_webhook_signature, WebhookError};
