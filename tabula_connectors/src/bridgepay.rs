//! BridgePay: API-key authenticated, single-step charges. Priced above Meridian, so it normally serves as the
//! failover path rather than the first choice.
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
    config::BridgePayConfig,
    error::{map_reqwest_error, ConnectorError},
    helpers::verify_hmac,
};

#[derive(Clone)]
pub struct BridgePayAdapter {
    name: ProviderId,
    config: BridgePayConfig,
    client: Arc<Client>,
}

#[derive(Debug, Serialize)]
struct TransactionBody<'a> {
    amount: i64,
    currency: &'a str,
    external_ref: &'a str,
    request_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    transaction_id: String,
    result: String,
    #[serde(default)]
    result_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    event: String,
    transaction_id: Option<String>,
    external_ref: Option<String>,
    #[serde(default)]
    result_code: Option<String>,
}

impl BridgePayAdapter {
    pub fn new(config: BridgePayConfig) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ConnectorError::Initialization(e.to_string()))?;
        Ok(Self { name: ProviderId::from("bridgepay"), config, client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.config.base_url)
    }

    async fn post_transaction_call(
        &self,
        path: &str,
        body: impl Serialize,
        credential: &Credential,
    ) -> Result<AdapterResult, AdapterError> {
        let key = credential
            .api_key()
            .ok_or_else(|| AdapterError::Protocol("BridgePay requires an API-key credential".to_string()))?;
        let key = HeaderValue::from_str(key)
            .map_err(|e| AdapterError::Protocol(format!("Invalid BridgePay API key: {e}")))?;
        let response = self
            .client
            .post(self.url(path))
            .header("X-BridgePay-Key", key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(AdapterError::Network(format!("BridgePay answered {status}")));
        }
        if !status.is_success() && status != StatusCode::PAYMENT_REQUIRED {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Protocol(format!("BridgePay answered {status}: {message}")));
        }
        let txn: TransactionResponse = response.json().await.map_err(|e| AdapterError::Protocol(e.to_string()))?;
        trace!("BridgePay answered {} for transaction {}", txn.result, txn.transaction_id);
        match txn.result.as_str() {
            "approved" => Ok(AdapterResult::success(txn.transaction_id)),
            "declined" => Ok(AdapterResult::declined(txn.result_code.unwrap_or_else(|| "declined".to_string()))),
            s => Err(AdapterError::Protocol(format!("Unknown BridgePay result: {s}"))),
        }
    }
}

#[async_trait]
impl ProviderAdapter for BridgePayAdapter {
    fn name(&self) -> &ProviderId {
        &self.name
    }

    async fn authorize(&self, req: &AuthorizeRequest, credential: &Credential) -> Result<AdapterResult, AdapterError> {
        let body = TransactionBody {
            amount: req.amount.value(),
            currency: &req.currency,
            external_ref: &req.attempt_ref,
            request_id: req.idempotency_key.as_str(),
        };
        debug!("Placing BridgePay transaction for {} ({})", req.amount, req.attempt_ref);
        self.post_transaction_call("/transactions", body, credential).await
    }

    async fn capture(
        &self,
        provider_reference: &str,
        _amount: Money,
        credential: &Credential,
    ) -> Result<AdapterResult, AdapterError> {
        // Single-step on BridgePay's side; retriable no-op.
        self.post_transaction_call(
            &format!("/transactions/{provider_reference}/capture"),
            serde_json::json!({}),
            credential,
        )
        .await
    }

    async fn refund(
        &self,
        provider_reference: &str,
        amount: Money,
        credential: &Credential,
    ) -> Result<AdapterResult, AdapterError> {
        debug!("Refunding {amount} on BridgePay transaction {provider_reference}");
        let body = serde_json::json!({ "amount": amount.value() });
        self.post_transaction_call(&format!("/transactions/{provider_reference}/refund"), body, credential).await
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str, webhook_secret: &str) -> bool {
        verify_hmac(webhook_secret, payload, signature)
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<WebhookEvent, AdapterError> {
        let body: WebhookBody = serde_json::from_slice(payload).map_err(|e| AdapterError::Protocol(e.to_string()))?;
        let kind = match body.event.as_str() {
            "transaction.settled" => WebhookKind::Captured,
            "transaction.failed" => WebhookKind::Failed,
            "transaction.refunded" => WebhookKind::Refunded,
            e => return Err(AdapterError::Protocol(format!("Unknown BridgePay event: {e}"))),
        };
        Ok(WebhookEvent {
            kind,
            provider_reference: body.transaction_id,
            attempt_ref: body.external_ref,
            raw_code: body.result_code,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::helpers::calculate_hmac;

    fn adapter() -> BridgePayAdapter {
        BridgePayAdapter::new(BridgePayConfig::default()).unwrap()
    }

    #[test]
    fn parses_settled_webhook_as_captured() {
        let payload = br#"{ "event": "transaction.settled", "transaction_id": "tx-77", "external_ref": "intent-7/3" }"#;
        let event = adapter().parse_webhook(payload).unwrap();
        assert_eq!(event.kind, WebhookKind::Captured);
        assert_eq!(event.provider_reference.as_deref(), Some("tx-77"));
    }

    #[test]
    fn signature_scheme_matches_the_other_providers() {
        let a = adapter();
        let payload = b"{\"event\":\"transaction.settled\"}";
        let signature = calculate_hmac("whsec_bp", payload);
        assert!(a.verify_webhook_signature(payload, &signature, "whsec_bp"));
        assert!(!a.verify_webhook_signature(payload, "bogus", "whsec_bp"));
    }
}
