//! End-to-end lifecycle scenarios through [`LifecycleCoordinator`], mirroring
//! §8's literal test scenarios.

use std::str::FromStr;
use std::time::Duration;

use gateway_common::amount::Currency;
use gateway_common::ids::{OrderId, PaymentId, TeamSlug};
use gateway_core::coordinator::{CoordinatorError, InitRequest, LifecycleCoordinator};
use gateway_core::lock::LockService;
use gateway_core::merchant_store::{MerchantStore, StaticMerchantSource};
use gateway_core::model::{Merchant, PayType, PaymentStatus};
use gateway_core::payment_store::PaymentStore;
use gateway_core::rate_limit::RateLimiter;
use gateway_core::test_support::{amount, RecordingWebhookSink, ScriptedAcquirer};
use gateway_core::webhook::{WebhookConfig, WebhookNotifier};

type TestCoordinator =
    LifecycleCoordinator<ScriptedAcquirer, StaticMerchantSource, RecordingWebhookSink>;

fn demo_merchant(daily_limit: u64) -> Merchant {
    Merchant {
        team_slug: TeamSlug::from_str("demo-team").unwrap(),
        password_hash: "d3ad".repeat(16),
        active: true,
        success_url: None,
        fail_url: None,
        notification_url: Some("https://merchant.example/hook".to_string()),
        supported_currencies: vec![Currency::default()],
        min_amount: amount(1000),
        max_amount: amount(9_999_999),
        daily_limit: amount(daily_limit),
        monthly_limit: amount(9_999_999_999),
    }
}

fn build_coordinator(daily_limit: u64) -> TestCoordinator {
    let mut source = StaticMerchantSource::new();
    source.insert(demo_merchant(daily_limit));
    LifecycleCoordinator::new(
        LockService::new(),
        RateLimiter::new(),
        PaymentStore::new(),
        MerchantStore::new(source, Duration::from_secs(60)),
        ScriptedAcquirer::new(),
        WebhookNotifier::new(RecordingWebhookSink::new(), WebhookConfig::default()),
    )
}

fn team() -> TeamSlug {
    TeamSlug::from_str("demo-team").unwrap()
}

/// Scenario 1: single-stage happy path ends `CONFIRMED`, having passed
/// through `AUTHORIZING` -> `AUTHORIZED` -> `CONFIRMING` -> `CONFIRMED`.
#[tokio::test]
async fn single_stage_happy_path() {
    let coordinator = build_coordinator(1_000_000_000);
    let init = coordinator
        .init(InitRequest {
            team_slug: team(),
            order_id: OrderId::from_str("O1").unwrap(),
            amount: amount(15000),
            currency: Currency::default(),
            pay_type: PayType::OneStage,
            success_url: None,
            fail_url: None,
            notification_url: None,
        })
        .await
        .unwrap();
    assert_eq!(init.status, PaymentStatus::New);
    assert!(!init.payment_url.is_empty());

    let status = coordinator
        .submit_card(&team(), &init.payment_id, "tok_visa")
        .await
        .unwrap();
    assert_eq!(status, PaymentStatus::Confirmed);

    let payment = coordinator.status(&team(), &init.payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Confirmed);
    assert!(payment.confirmed_at.is_some());

    assert!(coordinator.webhooks.pending_len().await > 0);
    coordinator.webhooks.run_once().await;
    assert!(!coordinator.webhooks.sink().delivered().is_empty());
}

/// Scenario 2: two-stage partial capture, then a second confirm on an
/// already-`CONFIRMED` payment is illegal (the real authorized state has
/// moved past `AUTHORIZED`).
#[tokio::test]
async fn two_stage_partial_capture_then_illegal_second_confirm() {
    let coordinator = build_coordinator(1_000_000_000);
    let init = coordinator
        .init(InitRequest {
            team_slug: team(),
            order_id: OrderId::from_str("O2").unwrap(),
            amount: amount(200000),
            currency: Currency::default(),
            pay_type: PayType::TwoStage,
            success_url: None,
            fail_url: None,
            notification_url: None,
        })
        .await
        .unwrap();

    let status = coordinator
        .submit_card(&team(), &init.payment_id, "tok_visa")
        .await
        .unwrap();
    assert_eq!(status, PaymentStatus::Authorized);

    let status = coordinator
        .confirm(&team(), &init.payment_id, Some(amount(150000)))
        .await
        .unwrap();
    assert_eq!(status, PaymentStatus::Confirmed);

    let payment = coordinator
        .status(&team(), &init.payment_id)
        .await
        .unwrap();
    assert_eq!(payment.confirmed_amount, Some(amount(150000)));

    // Already confirmed with the same amount: idempotent re-confirm
    // short-circuits to the same status rather than attempting a new
    // transition (§8).
    let status = coordinator
        .confirm(&team(), &init.payment_id, Some(amount(150000)))
        .await
        .unwrap();
    assert_eq!(status, PaymentStatus::Confirmed);

    // Already confirmed with a *different* amount: not idempotent, rejected
    // as an illegal transition (§8 scenario 2).
    let err = coordinator
        .confirm(&team(), &init.payment_id, Some(amount(50000)))
        .await
        .unwrap_err();
    assert_eq!(err, CoordinatorError::IllegalStateTransition);
}

/// Scenario 3: duplicate `(team, order)` — exactly one `init` succeeds.
#[tokio::test]
async fn duplicate_order_rejected() {
    let coordinator = build_coordinator(1_000_000_000);
    let req = || InitRequest {
        team_slug: team(),
        order_id: OrderId::from_str("O3").unwrap(),
        amount: amount(15000),
        currency: Currency::default(),
        pay_type: PayType::OneStage,
        success_url: None,
        fail_url: None,
        notification_url: None,
    };
    coordinator.init(req()).await.unwrap();
    let err = coordinator.init(req()).await.unwrap_err();
    assert_eq!(err, CoordinatorError::DuplicateOrder);
}

/// Scenario 4: `confirm` on a payment still in `NEW` is illegal.
#[tokio::test]
async fn confirm_on_new_is_illegal() {
    let coordinator = build_coordinator(1_000_000_000);
    let init = coordinator
        .init(InitRequest {
            team_slug: team(),
            order_id: OrderId::from_str("O4").unwrap(),
            amount: amount(15000),
            currency: Currency::default(),
            pay_type: PayType::TwoStage,
            success_url: None,
            fail_url: None,
            notification_url: None,
        })
        .await
        .unwrap();

    let err = coordinator
        .confirm(&team(), &init.payment_id, None)
        .await
        .unwrap_err();
    assert_eq!(err, CoordinatorError::IllegalStateTransition);
}

/// A payment id from another merchant is reported `NotFound`, not leaked.
#[tokio::test]
async fn cross_merchant_access_is_not_found() {
    let coordinator = build_coordinator(1_000_000_000);
    let init = coordinator
        .init(InitRequest {
            team_slug: team(),
            order_id: OrderId::from_str("O5").unwrap(),
            amount: amount(15000),
            currency: Currency::default(),
            pay_type: PayType::OneStage,
            success_url: None,
            fail_url: None,
            notification_url: None,
        })
        .await
        .unwrap();

    let other_team = TeamSlug::from_str("other-team").unwrap();
    let err = coordinator
        .status(&other_team, &init.payment_id)
        .await
        .unwrap_err();
    assert_eq!(err, CoordinatorError::NotFound);
}

/// §8: confirming beyond the merchant's daily limit is rejected.
#[tokio::test]
async fn daily_limit_enforced_on_confirm() {
    let coordinator = build_coordinator(20000);
    let init = coordinator
        .init(InitRequest {
            team_slug: team(),
            order_id: OrderId::from_str("O6").unwrap(),
            amount: amount(25000),
            currency: Currency::default(),
            pay_type: PayType::TwoStage,
            success_url: None,
            fail_url: None,
            notification_url: None,
        })
        .await
        .unwrap();
    coordinator
        .submit_card(&team(), &init.payment_id, "tok_visa")
        .await
        .unwrap();

    let err = coordinator
        .confirm(&team(), &init.payment_id, None)
        .await
        .unwrap_err();
    assert_eq!(err, CoordinatorError::LimitExceeded);
}

/// §8: a partial refund leaves the payment `PARTIAL_REFUNDED` with the
/// requested amount recorded, and a second refund for the remainder reaches
/// `REFUNDED` rather than re-refunding the whole confirmed balance.
#[tokio::test]
async fn partial_then_full_refund() {
    let coordinator = build_coordinator(1_000_000_000);
    let init = coordinator
        .init(InitRequest {
            team_slug: team(),
            order_id: OrderId::from_str("O7").unwrap(),
            amount: amount(200000),
            currency: Currency::default(),
            pay_type: PayType::TwoStage,
            success_url: None,
            fail_url: None,
            notification_url: None,
        })
        .await
        .unwrap();

    coordinator
        .submit_card(&team(), &init.payment_id, "tok_visa")
        .await
        .unwrap();
    coordinator
        .confirm(&team(), &init.payment_id, Some(amount(200000)))
        .await
        .unwrap();

    let status = coordinator
        .refund(&team(), &init.payment_id, amount(80000))
        .await
        .unwrap();
    assert_eq!(status, PaymentStatus::PartialRefunded);

    let payment = coordinator.status(&team(), &init.payment_id).await.unwrap();
    assert_eq!(payment.refunded_amount, Some(amount(80000)));

    let status = coordinator
        .refund(&team(), &init.payment_id, amount(120000))
        .await
        .unwrap();
    assert_eq!(status, PaymentStatus::Refunded);

    let payment = coordinator.status(&team(), &init.payment_id).await.unwrap();
    assert_eq!(payment.refunded_amount, Some(amount(200000)));
}

/// An invalid payment id never reaches `NotFound` vs `IllegalStateTransition`
/// ambiguity: unknown ids are always `NotFound`.
#[tokio::test]
async fn unknown_payment_is_not_found() {
    let coordinator = build_coordinator(1_000_000_000);
    let unknown = PaymentId::from_str("does-not-exist").unwrap();
    let err = coordinator.status(&team(), &unknown).await.unwrap_err();
    assert_eq!(err, CoordinatorError::NotFound);
}
