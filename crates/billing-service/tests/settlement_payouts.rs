//! Integration tests for settlement and payouts.
//!
//! Covers the path from a finalized session to a provider transfer:
//! commission split, earnings credit, threshold-gated payout and failure
//! isolation across a batch.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use billing_service::payout::PayoutFailure;
use billing_service::session::SessionKind;
use billing_service::settlement::{split, CommissionPolicy};
use billing_service::BillingError;
use billing_test_utils::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const UNIT: Duration = Duration::from_secs(60);

// ============================================================================
// Commission split
// ============================================================================

#[test]
fn test_default_policy_splits_ten_dollars() {
    let s = split(dec!(10.00), &CommissionPolicy::default()).unwrap();

    assert_eq!(s.platform_fee, dec!(3.00));
    assert_eq!(s.provider_earnings, dec!(7.00));
}

#[test]
fn test_split_sums_exactly_for_awkward_policies() {
    let policies = [
        CommissionPolicy::new(dec!(0.333), dec!(0.667)).unwrap(),
        CommissionPolicy::new(dec!(0.125), dec!(0.875)).unwrap(),
        CommissionPolicy::new(dec!(0.5), dec!(0.5)).unwrap(),
        CommissionPolicy::new(dec!(1), dec!(0)).unwrap(),
    ];

    for policy in &policies {
        let mut total = Decimal::ZERO;
        while total <= dec!(100.00) {
            let s = split(total, policy).unwrap();
            assert_eq!(s.platform_fee + s.provider_earnings, total, "{policy:?} {total}");
            assert!(s.platform_fee >= Decimal::ZERO);
            assert!(s.provider_earnings >= Decimal::ZERO);
            total += dec!(0.01);
        }
    }
}

#[test]
fn test_policy_must_sum_to_one() {
    assert!(matches!(
        CommissionPolicy::new(dec!(0.30), dec!(0.60)),
        Err(BillingError::InvalidCommissionPolicy(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_custom_commission_from_config() {
    let harness = EngineHarness::builder()
        .with_var("BILLING_PLATFORM_RATE", "0.20")
        .with_var("BILLING_PROVIDER_RATE", "0.80")
        .with_balance(TEST_PAYER, dec!(100.00))
        .build();
    let id = harness.start_text_session(dec!(5.00)).await.session.id;
    harness.elapse(UNIT * 2).await;

    let finalized = harness.engine.end_session(id).await.unwrap();

    let settlement = finalized.settlement.unwrap();
    assert_eq!(settlement.total, dec!(10.00));
    assert_eq!(settlement.platform_fee, dec!(2.00));
    assert_eq!(settlement.provider_earnings, dec!(8.00));
}

// ============================================================================
// Earnings
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sessions_and_gifts_accumulate_earnings() {
    let harness = EngineHarness::builder()
        .with_balance(TEST_PAYER, dec!(500.00))
        .build();

    for _ in 0..3 {
        let id = harness.start_text_session(dec!(2.99)).await.session.id;
        harness.elapse(Duration::from_secs(225)).await;
        harness.engine.end_session(id).await.unwrap();
    }
    harness
        .engine
        .settle_gift(TEST_PROVIDER, dec!(9.99))
        .await
        .unwrap();

    // Three sessions of 11.96 plus a 9.99 gift.
    let session_split = split(dec!(11.96), &CommissionPolicy::default()).unwrap();
    let gift_split = split(dec!(9.99), &CommissionPolicy::default()).unwrap();
    let expected_provider = session_split.provider_earnings * dec!(3) + gift_split.provider_earnings;
    let expected_platform = session_split.platform_fee * dec!(3) + gift_split.platform_fee;

    let earnings = harness
        .engine
        .provider_earnings(TEST_PROVIDER)
        .await
        .unwrap();
    assert_eq!(earnings.total_earned, expected_provider);
    assert_eq!(earnings.pending_payout, expected_provider);
    assert_eq!(harness.engine.platform_revenue().await, expected_platform);
    assert_eq!(
        expected_provider + expected_platform,
        dec!(11.96) * dec!(3) + dec!(9.99)
    );
}

#[tokio::test(start_paused = true)]
async fn test_disputed_session_is_not_credited() {
    let harness = EngineHarness::builder()
        .with_balance(TEST_PAYER, dec!(100.00))
        .build();
    let id = harness
        .start_session(SessionKind::Video, dec!(4.99))
        .await
        .session
        .id;
    harness.elapse(UNIT * 3).await;

    let disputed = harness
        .engine
        .dispute_session(id, "reading never started")
        .await
        .unwrap();

    assert_eq!(disputed.session.final_cost, Some(dec!(14.97)));
    assert!(disputed.settlement.is_some());
    assert!(!disputed.credited);
    assert_eq!(harness.engine.provider_earnings(TEST_PROVIDER).await, None);
    assert_eq!(harness.engine.platform_revenue().await, Decimal::ZERO);
}

// ============================================================================
// Payouts
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_below_minimum_payout_makes_no_rail_call() {
    let harness = EngineHarness::builder().build();

    let outcome = harness
        .engine
        .run_daily_payout(TEST_PROVIDER, dec!(14.99), "acct_reader")
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.failure, Some(PayoutFailure::BelowMinimum));
    assert_eq!(harness.rail.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_minimum_payout_is_configurable() {
    let harness = EngineHarness::builder()
        .with_var("BILLING_MINIMUM_PAYOUT", "5.00")
        .build();

    let outcome = harness
        .engine
        .run_daily_payout(TEST_PROVIDER, dec!(5.00), "acct_reader")
        .await;

    assert!(outcome.success);
    assert_eq!(harness.rail.transfers().first().unwrap().amount_minor, 500);
}

#[tokio::test(start_paused = true)]
async fn test_payout_cycle_isolates_failures() {
    let harness = EngineHarness::builder()
        .with_rail(MockPaymentRail::failing_for(["acct_declined"]))
        .build();

    for (provider, destination) in [
        ("reader-a", "acct_ok_a"),
        ("reader-b", "acct_declined"),
        ("reader-c", "acct_ok_c"),
    ] {
        harness
            .engine
            .settle_gift(provider, dec!(50.00))
            .await
            .unwrap();
        harness
            .engine
            .register_payout_destination(provider, destination)
            .await;
    }

    let report = harness.engine.run_payouts().await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.total_paid(), dec!(70.00));

    let declined = harness
        .engine
        .provider_earnings("reader-b")
        .await
        .unwrap();
    assert_eq!(declined.pending_payout, dec!(35.00));
    assert_eq!(declined.total_paid, Decimal::ZERO);

    let paid = harness
        .engine
        .provider_earnings("reader-a")
        .await
        .unwrap();
    assert_eq!(paid.pending_payout, Decimal::ZERO);
    assert_eq!(paid.total_paid, dec!(35.00));

    // A second cycle only retries the provider still owed.
    let retry = harness.engine.run_payouts().await;
    assert_eq!(retry.outcomes.len(), 1);
    assert_eq!(retry.outcomes.first().unwrap().provider_id, "reader-b");
}

#[tokio::test(start_paused = true)]
async fn test_background_payout_task_pays_on_interval() {
    let harness = EngineHarness::builder()
        .with_var("BILLING_PAYOUT_INTERVAL_SECONDS", "3600")
        .build();
    harness
        .engine
        .settle_gift(TEST_PROVIDER, dec!(100.00))
        .await
        .unwrap();
    harness
        .engine
        .register_payout_destination(TEST_PROVIDER, "acct_reader")
        .await;

    harness.engine.spawn_background_tasks().await;
    harness.elapse(Duration::from_secs(60)).await;
    assert_eq!(harness.rail.call_count(), 0);

    harness.elapse(Duration::from_secs(3600)).await;
    assert_eq!(harness.rail.call_count(), 1);
    assert_eq!(
        harness
            .engine
            .provider_earnings(TEST_PROVIDER)
            .await
            .unwrap()
            .total_paid,
        dec!(70.00)
    );

    harness.engine.shutdown().await;
}
