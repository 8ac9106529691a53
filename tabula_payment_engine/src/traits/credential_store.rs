use chrono::{DateTime, Utc};

use crate::{credentials::CredentialError, db_types::ProviderId};

/// A provider credential as persisted: the secret material is sealed (AES-256-GCM under the process key) and
/// opaque to the store. Only the credential manager can open it.
#[derive(Debug, Clone)]
pub struct SealedCredential {
    pub provider: ProviderId,
    /// Nonce-prefixed AES-256-GCM ciphertext of the JSON-encoded secret material.
    pub sealed_material: Vec<u8>,
    /// For OAuth2 credentials, when the current access token expires. `None` for static keys.
    pub token_expiry: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Durable storage for provider credentials. Mutated only by the credential manager's refresh routine;
/// everything else is read-only traffic.
#[allow(async_fn_in_trait)]
pub trait CredentialStore: Clone + Send + Sync {
    async fn fetch_credential(&self, provider: &ProviderId) -> Result<Option<SealedCredential>, CredentialError>;

    /// Insert or replace the credential row for `credential.provider`.
    async fn upsert_credential(&self, credential: &SealedCredential) -> Result<(), CredentialError>;
}
