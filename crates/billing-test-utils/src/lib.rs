//! # Billing Test Utilities
//!
//! Shared test utilities for the session billing engine.
//!
//! Provides a fully wired [`EngineHarness`] backed by in-memory collaborators
//! and a manual clock, so integration tests can drive timers and wall-clock
//! charging deterministically.
//!
//! ## Modules
//!
//! - `fixtures` - Test configuration, certificate and parties
//! - `harness` - `BillingEngine` wired to mocks and a `ManualClock`
//! - `observer` - Recording `LiveEstimateObserver`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use billing_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let harness = EngineHarness::builder()
//!         .with_balance(TEST_PAYER, dec!(50.00))
//!         .build();
//!
//!     let started = harness.start_text_session(dec!(2.99)).await;
//!     harness.elapse(Duration::from_secs(60)).await;
//!
//!     let finalized = harness.engine.end_session(started.session.id).await.unwrap();
//! }
//! ```
//!
//! Tests using the harness must run with `start_paused = true`; `elapse`
//! advances tokio's clock together with the engine's wall clock.

pub mod fixtures;
pub mod harness;
pub mod observer;

pub use billing_service::clock::ManualClock;
pub use billing_service::services::ledger::mock::MockLedger;
pub use billing_service::services::payment_rail::mock::MockPaymentRail;
pub use fixtures::*;
pub use harness::*;
pub use observer::*;
