//! A provider adapter driven by a pre-loaded script instead of a network.
//!
//! Each call pops the next scripted response, so a test can say "time out once, then succeed" and assert on
//! exactly how many calls were made. Webhook verification uses a trivially checkable signature scheme; the
//! payload format is the engine's neutral event shape as JSON.
use std::{
    collections::VecDeque,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tab_common::Money;

use crate::{
    credentials::Credential,
    db_types::ProviderId,
    traits::{AdapterError, AdapterResult, AuthorizeRequest, ProviderAdapter, WebhookEvent, WebhookKind},
};

#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Success { reference: String },
    Declined { code: String },
    NetworkError,
    /// Sleeps for the given duration before answering, to trip the orchestrator's call budget.
    Hang(Duration),
}

pub struct ScriptedAdapter {
    name: ProviderId,
    separate_capture: bool,
    responses: Mutex<VecDeque<ScriptedResponse>>,
    authorize_calls: Mutex<Vec<AuthorizeRequest>>,
    capture_calls: Mutex<Vec<String>>,
    refund_calls: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub fn new<P: Into<ProviderId>>(name: P, responses: Vec<ScriptedResponse>) -> Self {
        Self {
            name: name.into(),
            separate_capture: false,
            responses: Mutex::new(responses.into()),
            authorize_calls: Mutex::new(Vec::new()),
            capture_calls: Mutex::new(Vec::new()),
            refund_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_separate_capture(mut self) -> Self {
        self.separate_capture = true;
        self
    }

    pub fn authorize_calls(&self) -> Vec<AuthorizeRequest> {
        self.authorize_calls.lock().unwrap().clone()
    }

    pub fn capture_calls(&self) -> Vec<String> {
        self.capture_calls.lock().unwrap().clone()
    }

    pub fn refund_calls(&self) -> Vec<String> {
        self.refund_calls.lock().unwrap().clone()
    }

    /// The signature a webhook payload must carry to pass verification for `secret`.
    pub fn sign(payload: &[u8], secret: &str) -> String {
        format!("scripted:{}:{}", secret, payload.len())
    }

    async fn next_response(&self) -> Result<AdapterResult, AdapterError> {
        let response = self.responses.lock().unwrap().pop_front();
        match response {
            Some(ScriptedResponse::Success { reference }) => Ok(AdapterResult::success(reference)),
            Some(ScriptedResponse::Declined { code }) => Ok(AdapterResult::declined(code)),
            Some(ScriptedResponse::NetworkError) => Err(AdapterError::Network("scripted outage".to_string())),
            Some(ScriptedResponse::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                Err(AdapterError::Timeout)
            },
            None => Err(AdapterError::Protocol("script exhausted".to_string())),
        }
    }
}

/// The neutral webhook payload shape tests post at the scripted adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedWebhook {
    pub kind: String,
    pub provider_reference: Option<String>,
    pub attempt_ref: Option<String>,
    pub raw_code: Option<String>,
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &ProviderId {
        &self.name
    }

    fn separate_capture(&self) -> bool {
        self.separate_capture
    }

    async fn authorize(&self, req: &AuthorizeRequest, _credential: &Credential) -> Result<AdapterResult, AdapterError> {
        self.authorize_calls.lock().unwrap().push(req.clone());
        self.next_response().await
    }

    async fn capture(
        &self,
        provider_reference: &str,
        _amount: Money,
        _credential: &Credential,
    ) -> Result<AdapterResult, AdapterError> {
        self.capture_calls.lock().unwrap().push(provider_reference.to_string());
        self.next_response().await
    }

    async fn refund(
        &self,
        provider_reference: &str,
        _amount: Money,
        _credential: &Credential,
    ) -> Result<AdapterResult, AdapterError> {
        self.refund_calls.lock().unwrap().push(provider_reference.to_string());
        self.next_response().await
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str, webhook_secret: &str) -> bool {
        signature == Self::sign(payload, webhook_secret)
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<WebhookEvent, AdapterError> {
        let webhook: ScriptedWebhook =
            serde_json::from_slice(payload).map_err(|e| AdapterError::Protocol(e.to_string()))?;
        let kind = match webhook.kind.as_str() {
            "captured" => WebhookKind::Captured,
            "failed" => WebhookKind::Failed,
            "refunded" => WebhookKind::Refunded,
            k => return Err(AdapterError::Protocol(format!("Unknown webhook kind: {k}"))),
        };
        Ok(WebhookEvent {
            kind,
            provider_reference: webhook.provider_reference,
            attempt_ref: webhook.attempt_ref,
            raw_code: webhook.raw_code,
        })
    }
}
