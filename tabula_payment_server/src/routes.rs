//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go into a separate
//! module. Keep this module neat and tidy 🙏
//!
//! All handlers are async: every one of them spends its time waiting on the ledger or a payment provider, and
//! blocking a worker thread on either would stall unrelated requests.
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use log::*;
use tabula_payment_engine::{
    api::{ChargeRequest, FailureReason, PaymentResult, ReconcileOutcome},
    db_types::{IntentId, ProviderId},
    OrchestratorApi,
    ReconcilerApi,
    SqliteLedger,
};

use crate::{
    data_objects::{ChargeParams, JsonResponse, RefundParams},
    errors::ServerError,
};

/// The server runs against the sqlite ledger; actix handlers cannot be generic over the backend, so the
/// concrete types are fixed here.
pub type Orchestrator = OrchestratorApi<SqliteLedger, SqliteLedger>;
pub type Reconciler = ReconcilerApi<SqliteLedger, SqliteLedger>;

//----------------------------------------------  Health  ------------------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------  Charge  ------------------------------------------------------------
/// Charge an order. Replaying the same intent id with the same details returns the stored outcome without
/// contacting any provider; the same id with different details is a 409.
#[post("/payments/{intent_id}")]
pub async fn charge(
    path: web::Path<String>,
    body: web::Json<ChargeParams>,
    api: web::Data<Orchestrator>,
) -> Result<HttpResponse, ServerError> {
    let intent_id = IntentId::from(path.into_inner());
    let params = body.into_inner();
    debug!("💻️ Charge request for intent {intent_id}: {} {}", params.amount, params.currency);
    let req = ChargeRequest {
        intent_id,
        order_id: params.order_id,
        amount: params.amount,
        currency: params.currency,
        channel: params.channel,
        card_origin: params.card_origin,
        preferred_providers: params.preferred_providers,
    };
    let result = api.charge(req).await?;
    Ok(payment_response(result))
}

/// The stored outcome of a charge. Read-only; never contacts a provider.
#[get("/payments/{intent_id}")]
pub async fn payment_status(
    path: web::Path<String>,
    api: web::Data<Orchestrator>,
) -> Result<HttpResponse, ServerError> {
    let intent_id = IntentId::from(path.into_inner());
    let result = api.status(&intent_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

//----------------------------------------------  Refund  ------------------------------------------------------------
#[post("/payments/{intent_id}/refund")]
pub async fn refund(
    path: web::Path<String>,
    body: web::Json<RefundParams>,
    api: web::Data<Orchestrator>,
) -> Result<HttpResponse, ServerError> {
    let intent_id = IntentId::from(path.into_inner());
    info!("💻️ Refund request for intent {intent_id}");
    let result = api.refund(&intent_id, body.amount).await?;
    Ok(HttpResponse::Ok().json(result))
}

//---------------------------------------------- Webhooks ------------------------------------------------------------
/// Receive a signed webhook from a payment provider. The raw body bytes are handed to the reconciler
/// untouched, since the signature covers them exactly as sent.
#[post("/webhooks/{provider}")]
pub async fn webhook(
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<Reconciler>,
) -> Result<HttpResponse, ServerError> {
    let provider = ProviderId::from(path.into_inner());
    let signature = req
        .headers()
        .get(signature_header(&provider))
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::MissingSignature)?;
    debug!("💻️ Webhook delivery from {provider} ({} bytes)", body.len());
    let outcome = api.handle(&provider, &body, signature).await?;
    let message = match outcome {
        ReconcileOutcome::Applied(_) => "applied",
        ReconcileOutcome::AlreadyApplied(_) => "already_applied",
        ReconcileOutcome::Superseded(_) => "superseded",
    };
    Ok(HttpResponse::Ok().json(JsonResponse::success(message)))
}

/// Each provider signs under its own header name; anything unrecognised is expected to use the generic one.
fn signature_header(provider: &ProviderId) -> &'static str {
    match provider.as_str() {
        "meridian" => "X-Meridian-Signature",
        "vantage" => "X-Vantage-Signature",
        "bridgepay" => "X-BridgePay-Signature",
        _ => "X-Webhook-Signature",
    }
}

fn payment_response(result: PaymentResult) -> HttpResponse {
    match result.failure {
        None => HttpResponse::Ok().json(result),
        Some(FailureReason::Declined) => HttpResponse::PaymentRequired().json(result),
        Some(FailureReason::AllProvidersExhausted) => HttpResponse::BadGateway().json(result),
    }
}
