use async_trait::async_trait;
use tab_common::Money;
use thiserror::Error;

use crate::{
    credentials::Credential,
    db_types::{AttemptOutcome, IntentId, ProviderId},
};

/// Uniform interface over one external payment network.
///
/// Adapters are stateless besides whatever connection pooling their HTTP client does; credentials are supplied
/// per call by the credential manager. The trait is object safe so the orchestrator can hold a registry of
/// `Arc<dyn ProviderAdapter>` and drive whichever provider the selection policy picks.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &ProviderId;

    /// True for providers that authorize and capture in two steps. The orchestrator then records the
    /// `Authorized` state and issues an explicit [`Self::capture`].
    fn separate_capture(&self) -> bool {
        false
    }

    /// Place the charge. A card decline is a successful call with [`AttemptOutcome::Declined`]; errors are
    /// reserved for infrastructure failures.
    async fn authorize(&self, req: &AuthorizeRequest, credential: &Credential) -> Result<AdapterResult, AdapterError>;

    /// Capture a previously authorized charge. Only meaningful when [`Self::separate_capture`] is true.
    async fn capture(
        &self,
        provider_reference: &str,
        amount: Money,
        credential: &Credential,
    ) -> Result<AdapterResult, AdapterError>;

    /// Return a captured amount to the customer.
    async fn refund(
        &self,
        provider_reference: &str,
        amount: Money,
        credential: &Credential,
    ) -> Result<AdapterResult, AdapterError>;

    /// Check the authenticity of a webhook payload against this provider's signature scheme. Pure; no network.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str, webhook_secret: &str) -> bool;

    /// Decode this provider's webhook payload into the engine's neutral event shape. Pure; no network.
    fn parse_webhook(&self, payload: &[u8]) -> Result<WebhookEvent, AdapterError>;
}

//-------------------------------------- AuthorizeRequest    ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub amount: Money,
    pub currency: String,
    /// Forwarded to the provider so that provider-side retries are deduplicated there too. Always equals the
    /// intent id.
    pub idempotency_key: IntentId,
    /// Our merchant reference for this attempt; providers echo it back in webhooks.
    pub attempt_ref: String,
}

//--------------------------------------   AdapterResult     ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct AdapterResult {
    pub outcome: AttemptOutcome,
    /// The provider's transaction id, when one was issued.
    pub provider_reference: Option<String>,
    /// The provider's own failure code, for the audit trail. Never surfaced to callers.
    pub raw_code: Option<String>,
}

impl AdapterResult {
    pub fn success<S: Into<String>>(provider_reference: S) -> Self {
        Self { outcome: AttemptOutcome::Success, provider_reference: Some(provider_reference.into()), raw_code: None }
    }

    pub fn declined<S: Into<String>>(raw_code: S) -> Self {
        Self { outcome: AttemptOutcome::Declined, provider_reference: None, raw_code: Some(raw_code.into()) }
    }
}

//--------------------------------------    WebhookEvent     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookKind {
    Captured,
    Failed,
    Refunded,
}

/// A provider callback, decoded into neutral terms. At least one of `provider_reference` / `attempt_ref` must
/// be present for the ledger lookup to succeed.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub kind: WebhookKind,
    pub provider_reference: Option<String>,
    pub attempt_ref: Option<String>,
    pub raw_code: Option<String>,
}

//--------------------------------------    AdapterError     ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("Could not reach the provider: {0}")]
    Network(String),
    #[error("The provider did not answer within the call budget")]
    Timeout,
    #[error("The provider answered with something we could not interpret: {0}")]
    Protocol(String),
}

impl AdapterError {
    /// Every adapter error is an infrastructure failure from the orchestrator's point of view: eligible for
    /// failover, never terminal for the card.
    pub fn as_outcome(&self) -> AttemptOutcome {
        match self {
            AdapterError::Timeout => AttemptOutcome::Timeout,
            AdapterError::Network(_) | AdapterError::Protocol(_) => AttemptOutcome::Error,
        }
    }
}
