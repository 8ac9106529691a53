//! Vantage: OAuth2-authenticated, two-step authorize/capture charges.
//!
//! The adapter only ever sees a ready-to-use access token; acquiring and refreshing tokens is the
//! [`VantageTokenRefresher`]'s job, driven by the engine's credential manager under its single-flight lock.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::*;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tab_common::Money;
use tabula_payment_engine::{
    credentials::{Credential, CredentialError, RefreshedToken, SecretMaterial, TokenRefresher},
    db_types::ProviderId,
    traits::{AdapterError, AdapterResult, AuthorizeRequest, ProviderAdapter, WebhookEvent, WebhookKind},
};

use crate::{
    config::VantageConfig,
    error::{map_reqwest_error, ConnectorError},
    helpers::verify_hmac,
};

#[derive(Clone)]
pub struct VantageAdapter {
    name: ProviderId,
    config: VantageConfig,
    client: Arc<Client>,
}

#[derive(Debug, Serialize)]
struct PaymentBody<'a> {
    amount_minor: i64,
    currency: &'a str,
    reference: &'a str,
    idempotency_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    payment_id: String,
    state: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(rename = "type")]
    event_type: String,
    payment_id: Option<String>,
    reference: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl VantageAdapter {
    pub fn new(config: VantageConfig) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ConnectorError::Initialization(e.to_string()))?;
        Ok(Self { name: ProviderId::from("vantage"), config, client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2{path}", self.config.base_url)
    }

    fn token<'a>(&self, credential: &'a Credential) -> Result<&'a str, AdapterError> {
        credential
            .access_token()
            .ok_or_else(|| AdapterError::Protocol("Vantage requires an OAuth2 credential".to_string()))
    }

    async fn post_payment_call(
        &self,
        path: &str,
        body: impl Serialize,
        credential: &Credential,
    ) -> Result<AdapterResult, AdapterError> {
        let token = self.token(credential)?;
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(AdapterError::Network(format!("Vantage answered {status}")));
        }
        if !status.is_success() && status != StatusCode::PAYMENT_REQUIRED {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Protocol(format!("Vantage answered {status}: {message}")));
        }
        let payment: PaymentResponse = response.json().await.map_err(|e| AdapterError::Protocol(e.to_string()))?;
        trace!("Vantage answered {} for payment {}", payment.state, payment.payment_id);
        match payment.state.as_str() {
            "authorized" | "captured" | "refunded" => Ok(AdapterResult::success(payment.payment_id)),
            "declined" => Ok(AdapterResult::declined(payment.reason.unwrap_or_else(|| "declined".to_string()))),
            s => Err(AdapterError::Protocol(format!("Unknown Vantage payment state: {s}"))),
        }
    }
}

#[async_trait]
impl ProviderAdapter for VantageAdapter {
    fn name(&self) -> &ProviderId {
        &self.name
    }

    fn separate_capture(&self) -> bool {
        true
    }

    async fn authorize(&self, req: &AuthorizeRequest, credential: &Credential) -> Result<AdapterResult, AdapterError> {
        let body = PaymentBody {
            amount_minor: req.amount.value(),
            currency: &req.currency,
            reference: &req.attempt_ref,
            idempotency_key: req.idempotency_key.as_str(),
        };
        debug!("Authorizing Vantage payment for {} ({})", req.amount, req.attempt_ref);
        self.post_payment_call("/payments", body, credential).await
    }

    async fn capture(
        &self,
        provider_reference: &str,
        amount: Money,
        credential: &Credential,
    ) -> Result<AdapterResult, AdapterError> {
        debug!("Capturing Vantage payment {provider_reference}");
        let body = serde_json::json!({ "amount_minor": amount.value() });
        self.post_payment_call(&format!("/payments/{provider_reference}/capture"), body, credential).await
    }

    async fn refund(
        &self,
        provider_reference: &str,
        amount: Money,
        credential: &Credential,
    ) -> Result<AdapterResult, AdapterError> {
        debug!("Refunding {amount} on Vantage payment {provider_reference}");
        let body = serde_json::json!({ "amount_minor": amount.value() });
        self.post_payment_call(&format!("/payments/{provider_reference}/refund"), body, credential).await
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str, webhook_secret: &str) -> bool {
        verify_hmac(webhook_secret, payload, signature)
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<WebhookEvent, AdapterError> {
        let body: WebhookBody = serde_json::from_slice(payload).map_err(|e| AdapterError::Protocol(e.to_string()))?;
        let kind = match body.event_type.as_str() {
            "payment.captured" => WebhookKind::Captured,
            "payment.failed" => WebhookKind::Failed,
            "payment.refunded" => WebhookKind::Refunded,
            t => return Err(AdapterError::Protocol(format!("Unknown Vantage event type: {t}"))),
        };
        Ok(WebhookEvent {
            kind,
            provider_reference: body.payment_id,
            attempt_ref: body.reference,
            raw_code: body.reason,
        })
    }
}

//-------------------------------------- VantageTokenRefresher -------------------------------------------------------
pub struct VantageTokenRefresher {
    token_url: String,
    client: Arc<Client>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

impl VantageTokenRefresher {
    pub fn new(config: &VantageConfig) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ConnectorError::Initialization(e.to_string()))?;
        Ok(Self { token_url: config.token_url.clone(), client: Arc::new(client) })
    }
}

#[async_trait]
impl TokenRefresher for VantageTokenRefresher {
    async fn refresh(
        &self,
        provider: &ProviderId,
        material: &SecretMaterial,
    ) -> Result<RefreshedToken, CredentialError> {
        let SecretMaterial::OAuth2 { client_id, client_secret, refresh_token, .. } = material else {
            return Err(CredentialError::RefreshUnsupported(provider.clone()));
        };
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];
        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(CredentialError::RefreshFailed(format!("Token endpoint answered {status}: {message}")));
        }
        let token: TokenResponse =
            response.json().await.map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;
        info!("🔑️ Vantage token exchange succeeded (expires in {}s)", token.expires_in);
        Ok(RefreshedToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn adapter() -> VantageAdapter {
        VantageAdapter::new(VantageConfig::default()).unwrap()
    }

    #[test]
    fn two_step_capture_is_advertised() {
        assert!(adapter().separate_capture());
    }

    #[test]
    fn parses_captured_webhook() {
        let payload = br#"{ "type": "payment.captured", "payment_id": "pay_9", "reference": "intent-5/2" }"#;
        let event = adapter().parse_webhook(payload).unwrap();
        assert_eq!(event.kind, WebhookKind::Captured);
        assert_eq!(event.provider_reference.as_deref(), Some("pay_9"));
        assert_eq!(event.attempt_ref.as_deref(), Some("intent-5/2"));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert!(adapter().parse_webhook(b"not json").is_err());
    }
}
