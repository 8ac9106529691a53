use actix_web::{
    http::StatusCode,
    test::{call_service, read_body_json, TestRequest},
};
use tabula_payment_engine::{
    api::{FailureReason, PaymentResult, Recommendation},
    db_types::IntentStatus,
    test_utils::scripted::{ScriptedAdapter, ScriptedResponse},
};

use crate::endpoint_tests::helpers::{charge_body, declined, outage, setup, success, test_app};

#[actix_web::test]
async fn health_check() {
    let h = setup(vec![success("alpha", "ch_1")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = TestRequest::get().uri("/health").to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[actix_web::test]
async fn charge_captures_and_prices_the_payment() {
    let h = setup(vec![success("alpha", "ch_1")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = TestRequest::post().uri("/payments/intent-ep-1").set_json(charge_body("order-1", 999)).to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let result: PaymentResult = read_body_json(res).await;
    assert_eq!(result.status, IntentStatus::Captured);
    assert_eq!(result.provider_reference.as_deref(), Some("ch_1"));
    let fees = result.fee_breakdown.expect("A captured payment must be priced");
    // 999 at 150bps + 10 fixed, platform at 100bps, both rounded half-up.
    assert_eq!(fees.provider_fee.value(), 25);
    assert_eq!(fees.platform_fee.value(), 10);
    assert_eq!(fees.net_to_merchant.value(), 964);
}

#[actix_web::test]
async fn declined_charge_is_a_402() {
    let h = setup(vec![declined("alpha", "insufficient_funds")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = TestRequest::post().uri("/payments/intent-ep-2").set_json(charge_body("order-2", 2500)).to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
    let result: PaymentResult = read_body_json(res).await;
    assert_eq!(result.failure, Some(FailureReason::Declined));
    assert_eq!(result.recommendation, Recommendation::TryAnotherMethod);
}

#[actix_web::test]
async fn exhausted_providers_are_a_502() {
    let h = setup(vec![outage("alpha"), outage("bravo")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = TestRequest::post().uri("/payments/intent-ep-3").set_json(charge_body("order-3", 1200)).to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let result: PaymentResult = read_body_json(res).await;
    assert_eq!(result.failure, Some(FailureReason::AllProvidersExhausted));
    assert_eq!(result.recommendation, Recommendation::Retry);
}

#[actix_web::test]
async fn conflicting_resubmission_is_a_409() {
    let h = setup(vec![success("alpha", "ch_9")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = TestRequest::post().uri("/payments/intent-ep-4").set_json(charge_body("order-4", 999)).to_request();
    assert_eq!(call_service(&app, req).await.status(), StatusCode::OK);
    // Same intent id, different amount.
    let req = TestRequest::post().uri("/payments/intent-ep-4").set_json(charge_body("order-4", 1999)).to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = read_body_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[actix_web::test]
async fn replayed_charge_returns_the_stored_outcome() {
    // Script holds exactly one response; the replay must not ask for another.
    let h = setup(vec![success("alpha", "ch_5")]).await;
    let adapter = h.adapters[0].clone();
    let app = test_app!(h.orchestrator, h.reconciler);
    let body = charge_body("order-5", 700);
    let req = TestRequest::post().uri("/payments/intent-ep-5").set_json(body.clone()).to_request();
    assert_eq!(call_service(&app, req).await.status(), StatusCode::OK);
    let req = TestRequest::post().uri("/payments/intent-ep-5").set_json(body).to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let result: PaymentResult = read_body_json(res).await;
    assert_eq!(result.status, IntentStatus::Captured);
    assert_eq!(adapter.authorize_calls().len(), 1);
}

#[actix_web::test]
async fn status_endpoint_reads_without_charging() {
    let h = setup(vec![success("alpha", "ch_6")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = TestRequest::post().uri("/payments/intent-ep-6").set_json(charge_body("order-6", 450)).to_request();
    assert_eq!(call_service(&app, req).await.status(), StatusCode::OK);
    let req = TestRequest::get().uri("/payments/intent-ep-6").to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let result: PaymentResult = read_body_json(res).await;
    assert_eq!(result.status, IntentStatus::Captured);
}

#[actix_web::test]
async fn status_of_an_unknown_intent_is_a_404() {
    let h = setup(vec![success("alpha", "ch_7")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = TestRequest::get().uri("/payments/no-such-intent").to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn full_refund_roundtrip() {
    let adapter = ScriptedAdapter::new("alpha", vec![
        ScriptedResponse::Success { reference: "ch_8".to_string() },
        ScriptedResponse::Success { reference: "rf_8".to_string() },
    ]);
    let h = setup(vec![adapter]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = TestRequest::post().uri("/payments/intent-ep-8").set_json(charge_body("order-8", 999)).to_request();
    assert_eq!(call_service(&app, req).await.status(), StatusCode::OK);
    let req = TestRequest::post()
        .uri("/payments/intent-ep-8/refund")
        .set_json(serde_json::json!({ "amount": 999 }))
        .to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let result: PaymentResult = read_body_json(res).await;
    assert_eq!(result.status, IntentStatus::Refunded);
}

#[actix_web::test]
async fn partial_refund_is_a_400() {
    let h = setup(vec![success("alpha", "ch_10")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = TestRequest::post().uri("/payments/intent-ep-9").set_json(charge_body("order-9", 999)).to_request();
    assert_eq!(call_service(&app, req).await.status(), StatusCode::OK);
    let req = TestRequest::post()
        .uri("/payments/intent-ep-9/refund")
        .set_json(serde_json::json!({ "amount": 500 }))
        .to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn refund_of_an_uncaptured_intent_is_a_409() {
    let h = setup(vec![declined("alpha", "do_not_honor")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = TestRequest::post().uri("/payments/intent-ep-10").set_json(charge_body("order-10", 999)).to_request();
    assert_eq!(call_service(&app, req).await.status(), StatusCode::PAYMENT_REQUIRED);
    let req = TestRequest::post()
        .uri("/payments/intent-ep-10/refund")
        .set_json(serde_json::json!({ "amount": 999 }))
        .to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}
