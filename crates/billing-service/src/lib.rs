//! Session Billing Engine Library
//!
//! Meters paid real-time sessions (text, voice, video) between a payer and a
//! provider:
//!
//! - Session lifecycle with per-session billing timers
//! - Signed media and messaging credentials for both parties
//! - Authoritative wall-clock charging at session end
//! - Commission split and provider earnings
//! - Threshold-gated provider payouts through a payment rail
//!
//! # Architecture
//!
//! ```text
//! BillingEngine (facade, owns config and collaborators)
//! ├── SessionRegistryActor (single writer of the session table)
//! │   └── BillingTimer (one per active session)
//! ├── BalanceGuard ──> LedgerStore
//! ├── EarningsLedger
//! ├── PayoutScheduler ──> PaymentRail
//! └── background tasks: retention sweeper, payout cycle
//! ```
//!
//! # Key Design Decisions
//!
//! - **Final wins**: the live estimate is advisory; the final charge is
//!   `ceil(elapsed / unit) * rate`, computed once from timestamps
//! - **Idempotent finalize**: ending a finalized session returns its record
//!   and never settles twice
//! - **No I/O in the actor**: ledger and payment-rail calls happen outside the
//!   registry
//!
//! # Modules
//!
//! - [`engine`] - Public facade
//! - [`actors`] - Registry actor and billing timers
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types with status codes

#![warn(clippy::pedantic)]

pub mod actors;
pub mod balance;
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod observability;
pub mod payout;
pub mod retention;
pub mod services;
pub mod session;
pub mod settlement;
pub mod tokens;

pub use engine::{BillingEngine, EngineCollaborators, FinalizedSession};
pub use errors::BillingError;
