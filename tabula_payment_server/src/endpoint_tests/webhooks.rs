use actix_web::{
    http::StatusCode,
    test::{call_service, read_body_json, TestRequest},
};
use tabula_payment_engine::{
    api::PaymentResult,
    db_types::IntentStatus,
    test_utils::scripted::{ScriptedAdapter, ScriptedWebhook},
};

use crate::{
    data_objects::JsonResponse,
    endpoint_tests::helpers::{charge_body, outage, setup, success, test_app, webhook_secret},
};

fn captured_payload(provider_reference: &str, attempt_ref: &str) -> Vec<u8> {
    let webhook = ScriptedWebhook {
        kind: "captured".to_string(),
        provider_reference: Some(provider_reference.to_string()),
        attempt_ref: Some(attempt_ref.to_string()),
        raw_code: None,
    };
    serde_json::to_vec(&webhook).unwrap()
}

fn signed_delivery(provider: &str, payload: Vec<u8>) -> TestRequest {
    let signature = ScriptedAdapter::sign(&payload, &webhook_secret(&provider.into()));
    TestRequest::post()
        .uri(&format!("/webhooks/{provider}"))
        .insert_header(("X-Webhook-Signature", signature))
        .set_payload(payload)
}

#[actix_web::test]
async fn late_webhook_upgrades_a_failed_payment() {
    let h = setup(vec![outage("alpha")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = TestRequest::post().uri("/payments/intent-wh-1").set_json(charge_body("order-1", 999)).to_request();
    assert_eq!(call_service(&app, req).await.status(), StatusCode::BAD_GATEWAY);
    // The provider heard us after all; its confirmation names the attempt we gave up on.
    let req = signed_delivery("alpha", captured_payload("ch_late", "intent-wh-1/1")).to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let ack: JsonResponse = read_body_json(res).await;
    assert_eq!(ack.message, "applied");
    let req = TestRequest::get().uri("/payments/intent-wh-1").to_request();
    let result: PaymentResult = read_body_json(call_service(&app, req).await).await;
    assert_eq!(result.status, IntentStatus::Captured);
    assert_eq!(result.provider_reference.as_deref(), Some("ch_late"));
}

#[actix_web::test]
async fn duplicate_delivery_is_acknowledged_without_effect() {
    let h = setup(vec![success("alpha", "ch_2")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = TestRequest::post().uri("/payments/intent-wh-2").set_json(charge_body("order-2", 500)).to_request();
    assert_eq!(call_service(&app, req).await.status(), StatusCode::OK);
    let payload = captured_payload("ch_2", "intent-wh-2/1");
    let res = call_service(&app, signed_delivery("alpha", payload).to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let ack: JsonResponse = read_body_json(res).await;
    assert_eq!(ack.message, "already_applied");
}

#[actix_web::test]
async fn forged_signature_is_a_401() {
    let h = setup(vec![success("alpha", "ch_3")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let payload = captured_payload("ch_3", "intent-wh-3/1");
    let req = TestRequest::post()
        .uri("/webhooks/alpha")
        .insert_header(("X-Webhook-Signature", "forged"))
        .set_payload(payload)
        .to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn missing_signature_is_a_401() {
    let h = setup(vec![success("alpha", "ch_4")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req =
        TestRequest::post().uri("/webhooks/alpha").set_payload(captured_payload("ch_4", "intent-wh-4/1")).to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn unknown_provider_is_a_404() {
    let h = setup(vec![success("alpha", "ch_5")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = signed_delivery("ghost", captured_payload("ch_5", "intent-wh-5/1")).to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn unknown_reference_is_a_404() {
    let h = setup(vec![success("alpha", "ch_6")]).await;
    let app = test_app!(h.orchestrator, h.reconciler);
    let req = signed_delivery("alpha", captured_payload("never-seen", "nobody/9")).to_request();
    let res = call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
