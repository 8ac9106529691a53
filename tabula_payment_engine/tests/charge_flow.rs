use std::{sync::Arc, time::Duration};

use tab_common::Money;
use tabula_payment_engine::{
    api::{FailureReason, OrchestratorConfig, Recommendation},
    db_types::{AttemptOutcome, IntentId, IntentStatus, ProviderId},
    test_utils::scripted::ScriptedAdapter,
    PaymentLedger,
};

mod support;
use support::*;

#[tokio::test]
async fn happy_path_captures_with_priced_fees() {
    let meridian = Arc::new(ScriptedAdapter::new("meridian", vec![success("mer-001")]));
    let harness = setup(vec![meridian.clone()]).await;
    let result = harness.orchestrator.charge(charge_request("intent-1", 999)).await.expect("charge failed");
    assert_eq!(result.status, IntentStatus::Captured);
    assert_eq!(result.provider, Some(ProviderId::from("meridian")));
    assert_eq!(result.provider_reference.as_deref(), Some("mer-001"));
    assert_eq!(result.recommendation, Recommendation::None);
    // 999 @ 150bps + 10 fixed = 15 + 10 = 25; platform 100bps = 10; net 964.
    let fees = result.fee_breakdown.expect("fee breakdown missing");
    assert_eq!(fees.provider_fee, Money::from(25));
    assert_eq!(fees.platform_fee, Money::from(10));
    assert_eq!(fees.net_to_merchant, Money::from(964));
    assert_eq!(meridian.authorize_calls().len(), 1);
    // The attempt carries the merchant reference the provider will echo back.
    let attempts = harness.ledger.attempts_for_intent(&IntentId::from("intent-1".to_string())).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].attempt_ref, "intent-1/1");
    assert_eq!(attempts[0].outcome, Some(AttemptOutcome::Success));
    tear_down(harness).await;
}

#[tokio::test]
async fn replayed_charge_returns_stored_outcome_without_a_provider_call() {
    // Only one scripted response: a second provider call would fail the test on its own.
    let meridian = Arc::new(ScriptedAdapter::new("meridian", vec![success("mer-002")]));
    let harness = setup(vec![meridian.clone()]).await;
    let first = harness.orchestrator.charge(charge_request("intent-2", 2500)).await.expect("charge failed");
    let second = harness.orchestrator.charge(charge_request("intent-2", 2500)).await.expect("replay failed");
    assert_eq!(first.status, IntentStatus::Captured);
    assert_eq!(second.status, IntentStatus::Captured);
    assert_eq!(second.provider_reference, first.provider_reference);
    assert_eq!(meridian.authorize_calls().len(), 1);
    tear_down(harness).await;
}

#[tokio::test]
async fn same_intent_with_different_details_is_rejected() {
    let meridian = Arc::new(ScriptedAdapter::new("meridian", vec![success("mer-003")]));
    let harness = setup(vec![meridian.clone()]).await;
    harness.orchestrator.charge(charge_request("intent-3", 1000)).await.expect("charge failed");
    let err = harness.orchestrator.charge(charge_request("intent-3", 9999)).await.unwrap_err();
    assert!(matches!(err, tabula_payment_engine::OrchestratorError::IntentConflict(_)));
    // The conflicting request never reached a provider.
    assert_eq!(meridian.authorize_calls().len(), 1);
    tear_down(harness).await;
}

#[tokio::test]
async fn failover_to_next_cheapest_on_outage() {
    let meridian = Arc::new(ScriptedAdapter::new("meridian", vec![outage()]));
    let bridgepay = Arc::new(ScriptedAdapter::new("bridgepay", vec![success("bp-001")]));
    let harness = setup(vec![meridian.clone(), bridgepay.clone()]).await;
    let result = harness.orchestrator.charge(charge_request("intent-4", 5000)).await.expect("charge failed");
    assert_eq!(result.status, IntentStatus::Captured);
    assert_eq!(result.provider, Some(ProviderId::from("bridgepay")));
    assert_eq!(meridian.authorize_calls().len(), 1);
    assert_eq!(bridgepay.authorize_calls().len(), 1);
    let intent = harness.ledger.fetch_intent(&IntentId::from("intent-4".to_string())).await.unwrap().unwrap();
    assert_eq!(intent.attempted_providers, vec![ProviderId::from("meridian")]);
    let attempts = harness.ledger.attempts_for_intent(&intent.id).await.unwrap();
    let successes = attempts.iter().filter(|a| a.outcome == Some(AttemptOutcome::Success)).count();
    assert_eq!(successes, 1, "exactly one attempt may succeed");
    tear_down(harness).await;
}

#[tokio::test]
async fn slow_provider_is_cut_off_and_failed_over() {
    let config = OrchestratorConfig { provider_timeout: Duration::from_millis(200), max_provider_attempts: 3 };
    let meridian = Arc::new(ScriptedAdapter::new("meridian", vec![hang(2_000)]));
    let bridgepay = Arc::new(ScriptedAdapter::new("bridgepay", vec![success("bp-002")]));
    let harness = setup_with_config(vec![meridian.clone(), bridgepay.clone()], config).await;
    let result = harness.orchestrator.charge(charge_request("intent-5", 5000)).await.expect("charge failed");
    assert_eq!(result.status, IntentStatus::Captured);
    assert_eq!(result.provider, Some(ProviderId::from("bridgepay")));
    let attempts = harness.ledger.attempts_for_intent(&IntentId::from("intent-5".to_string())).await.unwrap();
    assert_eq!(attempts[0].outcome, Some(AttemptOutcome::Timeout));
    tear_down(harness).await;
}

#[tokio::test]
async fn hard_decline_is_terminal_and_never_fails_over() {
    let meridian = Arc::new(ScriptedAdapter::new("meridian", vec![declined("insufficient_funds")]));
    let bridgepay = Arc::new(ScriptedAdapter::new("bridgepay", vec![success("bp-never")]));
    let harness = setup(vec![meridian.clone(), bridgepay.clone()]).await;
    let result = harness.orchestrator.charge(charge_request("intent-6", 1500)).await.expect("charge failed");
    assert_eq!(result.status, IntentStatus::Failed);
    assert_eq!(result.failure, Some(FailureReason::Declined));
    assert_eq!(result.recommendation, Recommendation::TryAnotherMethod);
    // Another provider would decline the same card; it is never asked.
    assert_eq!(bridgepay.authorize_calls().len(), 0);
    tear_down(harness).await;
}

#[tokio::test]
async fn exhausting_every_provider_fails_with_retry_advice() {
    let meridian = Arc::new(ScriptedAdapter::new("meridian", vec![outage()]));
    let bridgepay = Arc::new(ScriptedAdapter::new("bridgepay", vec![outage()]));
    let harness = setup(vec![meridian.clone(), bridgepay.clone()]).await;
    let result = harness.orchestrator.charge(charge_request("intent-7", 1500)).await.expect("charge failed");
    assert_eq!(result.status, IntentStatus::Failed);
    assert_eq!(result.failure, Some(FailureReason::AllProvidersExhausted));
    assert_eq!(result.recommendation, Recommendation::Retry);
    assert_eq!(meridian.authorize_calls().len(), 1);
    assert_eq!(bridgepay.authorize_calls().len(), 1);
    tear_down(harness).await;
}

#[tokio::test]
async fn preferred_provider_order_overrides_cost_ranking() {
    let meridian = Arc::new(ScriptedAdapter::new("meridian", vec![success("mer-never")]));
    let vantage = Arc::new(ScriptedAdapter::new("vantage", vec![success("van-001")]));
    let harness = setup(vec![meridian.clone(), vantage.clone()]).await;
    let mut req = charge_request("intent-8", 1500);
    req.preferred_providers = Some(vec![ProviderId::from("vantage"), ProviderId::from("meridian")]);
    let result = harness.orchestrator.charge(req).await.expect("charge failed");
    assert_eq!(result.provider, Some(ProviderId::from("vantage")));
    assert_eq!(meridian.authorize_calls().len(), 0);
    tear_down(harness).await;
}

#[tokio::test]
async fn two_step_providers_are_captured_explicitly() {
    let vantage = Arc::new(
        ScriptedAdapter::new("vantage", vec![success("van-002"), success("van-002")]).with_separate_capture(),
    );
    let harness = setup(vec![vantage.clone()]).await;
    let result = harness.orchestrator.charge(charge_request("intent-9", 3000)).await.expect("charge failed");
    assert_eq!(result.status, IntentStatus::Captured);
    assert_eq!(vantage.capture_calls(), vec!["van-002".to_string()]);
    tear_down(harness).await;
}

#[tokio::test]
async fn failed_capture_leaves_the_intent_authorized() {
    let vantage =
        Arc::new(ScriptedAdapter::new("vantage", vec![success("van-003"), outage()]).with_separate_capture());
    let harness = setup(vec![vantage.clone()]).await;
    let result = harness.orchestrator.charge(charge_request("intent-10", 3000)).await.expect("charge failed");
    // The funds stay reserved; the provider's webhook finishes the story.
    assert_eq!(result.status, IntentStatus::Authorized);
    assert_eq!(result.recommendation, Recommendation::None);
    tear_down(harness).await;
}

#[tokio::test]
async fn full_refund_then_idempotent_replay() {
    let meridian =
        Arc::new(ScriptedAdapter::new("meridian", vec![success("mer-004"), success("mer-004")]));
    let harness = setup(vec![meridian.clone()]).await;
    let intent_id = IntentId::from("intent-11".to_string());
    harness.orchestrator.charge(charge_request("intent-11", 4000)).await.expect("charge failed");
    let refunded = harness.orchestrator.refund(&intent_id, Money::from(4000)).await.expect("refund failed");
    assert_eq!(refunded.status, IntentStatus::Refunded);
    assert_eq!(meridian.refund_calls(), vec!["mer-004".to_string()]);
    // A second refund finds the terminal state and does not call the provider again.
    let replay = harness.orchestrator.refund(&intent_id, Money::from(4000)).await.expect("refund replay failed");
    assert_eq!(replay.status, IntentStatus::Refunded);
    assert_eq!(meridian.refund_calls().len(), 1);
    tear_down(harness).await;
}

#[tokio::test]
async fn partial_refunds_are_rejected() {
    let meridian = Arc::new(ScriptedAdapter::new("meridian", vec![success("mer-005")]));
    let harness = setup(vec![meridian.clone()]).await;
    let intent_id = IntentId::from("intent-12".to_string());
    harness.orchestrator.charge(charge_request("intent-12", 4000)).await.expect("charge failed");
    let err = harness.orchestrator.refund(&intent_id, Money::from(1000)).await.unwrap_err();
    assert!(matches!(err, tabula_payment_engine::OrchestratorError::PartialRefundUnsupported));
    assert_eq!(meridian.refund_calls().len(), 0);
    tear_down(harness).await;
}

#[tokio::test]
async fn refunds_require_a_captured_payment() {
    let meridian = Arc::new(ScriptedAdapter::new("meridian", vec![declined("do_not_honour")]));
    let harness = setup(vec![meridian.clone()]).await;
    let intent_id = IntentId::from("intent-13".to_string());
    harness.orchestrator.charge(charge_request("intent-13", 4000)).await.expect("charge failed");
    let err = harness.orchestrator.refund(&intent_id, Money::from(4000)).await.unwrap_err();
    assert!(matches!(
        err,
        tabula_payment_engine::OrchestratorError::NotRefundable(_, IntentStatus::Failed)
    ));
    tear_down(harness).await;
}

#[tokio::test]
async fn stale_attempts_are_swept_as_timeouts() {
    let meridian = Arc::new(ScriptedAdapter::new("meridian", vec![]));
    let harness = setup(vec![meridian.clone()]).await;
    let intent_id = IntentId::from("intent-14".to_string());
    let req = charge_request("intent-14", 1000);
    let new_intent = tabula_payment_engine::db_types::NewPaymentIntent {
        id: req.intent_id.clone(),
        order_id: req.order_id.clone(),
        amount: req.amount,
        currency: req.currency.clone(),
        channel: req.channel,
        card_origin: req.card_origin,
    };
    harness.ledger.create_intent(new_intent).await.unwrap();
    harness.ledger.insert_attempt(&intent_id, &ProviderId::from("meridian")).await.unwrap();
    let swept = harness.ledger.sweep_stale_attempts(chrono::Duration::zero()).await.unwrap();
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].outcome, Some(AttemptOutcome::Timeout));
    assert!(swept[0].finished_at.is_some());
    // A fresh attempt is untouched by a one-hour horizon.
    harness.ledger.insert_attempt(&intent_id, &ProviderId::from("meridian")).await.unwrap();
    let swept = harness.ledger.sweep_stale_attempts(chrono::Duration::hours(1)).await.unwrap();
    assert!(swept.is_empty());
    tear_down(harness).await;
}
