//! Meridian: API-key authenticated, single-step charges (authorization and capture in one call).
use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use reqwest::{header::HeaderValue, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tab_common::Money;
use tabula_payment_engine::{
    credentials::Credential,
    db_types::ProviderId,
    traits::{AdapterError, AdapterResult, AuthorizeRequest, ProviderAdapter, WebhookEvent, WebhookKind},
};

use crate::{
    config::MeridianConfig,
    error::{map_reqwest_error, ConnectorError},
    helpers::verify_hmac,
};

#[derive(Clone)]
pub struct MeridianAdapter {
    name: ProviderId,
    config: MeridianConfig,
    client: Arc<Client>,
}

#[derive(Debug, Serialize)]
struct ChargeBody<'a> {
    amount: i64,
    currency: &'a str,
    capture: bool,
    merchant_reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    id: String,
    status: String,
    #[serde(default)]
    decline_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    event_type: String,
    charge_id: Option<String>,
    merchant_reference: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl MeridianAdapter {
    pub fn new(config: MeridianConfig) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ConnectorError::Initialization(e.to_string()))?;
        Ok(Self { name: ProviderId::from("meridian"), config, client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.config.base_url)
    }

    fn api_key<'a>(&self, credential: &'a Credential) -> Result<&'a str, AdapterError> {
        credential
            .api_key()
            .ok_or_else(|| AdapterError::Protocol("Meridian requires an API-key credential".to_string()))
    }

    async fn post_charge_call(
        &self,
        path: &str,
        body: impl Serialize,
        idempotency_key: Option<&str>,
        credential: &Credential,
    ) -> Result<AdapterResult, AdapterError> {
        let key = self.api_key(credential)?;
        let mut req = self.client.post(self.url(path)).bearer_auth(key).json(&body);
        if let Some(ik) = idempotency_key {
            let value = HeaderValue::from_str(ik)
                .map_err(|e| AdapterError::Protocol(format!("Invalid idempotency key: {e}")))?;
            req = req.header("Idempotency-Key", value);
        }
        let response = req.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(AdapterError::Network(format!("Meridian answered {status}")));
        }
        if !status.is_success() && status != StatusCode::PAYMENT_REQUIRED {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Protocol(format!("Meridian answered {status}: {message}")));
        }
        let charge: ChargeResponse = response.json().await.map_err(|e| AdapterError::Protocol(e.to_string()))?;
        trace!("Meridian answered {} for charge {}", charge.status, charge.id);
        match charge.status.as_str() {
            "succeeded" => Ok(AdapterResult::success(charge.id)),
            "declined" => {
                Ok(AdapterResult::declined(charge.decline_code.unwrap_or_else(|| "declined".to_string())))
            },
            s => Err(AdapterError::Protocol(format!("Unknown Meridian charge status: {s}"))),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MeridianAdapter {
    fn name(&self) -> &ProviderId {
        &self.name
    }

    async fn authorize(&self, req: &AuthorizeRequest, credential: &Credential) -> Result<AdapterResult, AdapterError> {
        let body = ChargeBody {
            amount: req.amount.value(),
            currency: &req.currency,
            capture: true,
            merchant_reference: &req.attempt_ref,
        };
        debug!("Placing Meridian charge for {} ({})", req.amount, req.attempt_ref);
        self.post_charge_call("/charges", body, Some(req.idempotency_key.as_str()), credential).await
    }

    async fn capture(
        &self,
        provider_reference: &str,
        _amount: Money,
        credential: &Credential,
    ) -> Result<AdapterResult, AdapterError> {
        // Meridian charges auto-capture; an explicit capture call is a retriable no-op on their side.
        self.post_charge_call(&format!("/charges/{provider_reference}/capture"), serde_json::json!({}), None, credential)
            .await
    }

    async fn refund(
        &self,
        provider_reference: &str,
        amount: Money,
        credential: &Credential,
    ) -> Result<AdapterResult, AdapterError> {
        debug!("Refunding {amount} on Meridian charge {provider_reference}");
        let body = serde_json::json!({ "amount": amount.value() });
        self.post_charge_call(&format!("/charges/{provider_reference}/refunds"), body, None, credential).await
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str, webhook_secret: &str) -> bool {
        verify_hmac(webhook_secret, payload, signature)
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<WebhookEvent, AdapterError> {
        let body: WebhookBody = serde_json::from_slice(payload).map_err(|e| AdapterError::Protocol(e.to_string()))?;
        let kind = match body.event_type.as_str() {
            "charge.captured" => WebhookKind::Captured,
            "charge.failed" => WebhookKind::Failed,
            "charge.refunded" => WebhookKind::Refunded,
            t => return Err(AdapterError::Protocol(format!("Unknown Meridian event type: {t}"))),
        };
        Ok(WebhookEvent {
            kind,
            provider_reference: body.charge_id,
            attempt_ref: body.merchant_reference,
            raw_code: body.code,
        })
    }
}
