//! Provider credential management.
//!
//! Two kinds of credentials exist: static API keys and OAuth2 token pairs that need periodic refresh. Both are
//! sealed with AES-256-GCM under a single process-wide key loaded at startup, so the ledger only ever sees
//! opaque ciphertext. Refresh is single-flight per provider: concurrent callers finding a stale token block on
//! one per-provider lock, and only the winner talks to the token endpoint. Waiters are bounded by a refresh
//! timeout and fail fast rather than hang.
//!
//! Secrets never appear in logs: the decrypted material deliberately has a redacting `Debug` implementation.
use std::{
    collections::HashMap,
    fmt,
    fmt::Debug,
    sync::{Arc, Mutex},
    time::Duration,
};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
    Nonce,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::ProviderId,
    traits::{CredentialStore, SealedCredential},
};

/// How long before expiry a token is treated as already stale. Generous enough that a token handed to an
/// adapter does not expire mid-call.
const DEFAULT_REFRESH_MARGIN: chrono::Duration = chrono::Duration::seconds(60);
const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

//-------------------------------------- SecretMaterial      ---------------------------------------------------------
/// The decrypted contents of a credential row.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretMaterial {
    ApiKey {
        api_key: String,
        webhook_secret: String,
    },
    OAuth2 {
        client_id: String,
        client_secret: String,
        access_token: String,
        refresh_token: String,
        webhook_secret: String,
    },
}

impl Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretMaterial::ApiKey { .. } => f.write_str("ApiKey(****)"),
            SecretMaterial::OAuth2 { .. } => f.write_str("OAuth2(****)"),
        }
    }
}

impl SecretMaterial {
    pub fn webhook_secret(&self) -> &str {
        match self {
            SecretMaterial::ApiKey { webhook_secret, .. } | SecretMaterial::OAuth2 { webhook_secret, .. } => {
                webhook_secret
            },
        }
    }
}

//--------------------------------------    Credential       ---------------------------------------------------------
/// A ready-to-use credential as handed to provider adapters. Exposed only through the credential manager.
#[derive(Clone)]
pub struct Credential {
    provider: ProviderId,
    material: SecretMaterial,
}

impl Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({}, ****)", self.provider)
    }
}

impl Credential {
    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    pub fn api_key(&self) -> Option<&str> {
        match &self.material {
            SecretMaterial::ApiKey { api_key, .. } => Some(api_key),
            SecretMaterial::OAuth2 { .. } => None,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        match &self.material {
            SecretMaterial::OAuth2 { access_token, .. } => Some(access_token),
            SecretMaterial::ApiKey { .. } => None,
        }
    }

    pub fn webhook_secret(&self) -> &str {
        self.material.webhook_secret()
    }
}

//--------------------------------------      Sealer         ---------------------------------------------------------
/// AES-256-GCM seal/open under the process-wide credential key. The nonce is random per seal and prepended to
/// the ciphertext, so a sealed blob is self-contained.
#[derive(Clone)]
pub struct Sealer {
    key: [u8; 32],
}

impl Debug for Sealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Sealer(****)")
    }
}

impl Sealer {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Load the key from its 64-character hex form (the `TAB_CREDENTIAL_KEY` environment variable).
    pub fn from_hex(hex_key: &str) -> Result<Self, CredentialError> {
        let bytes = hex::decode(hex_key).map_err(|e| CredentialError::Crypto(format!("Invalid key hex: {e}")))?;
        let key: [u8; 32] =
            bytes.try_into().map_err(|_| CredentialError::Crypto("Credential key must be 32 bytes".into()))?;
        Ok(Self::new(key))
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|e| CredentialError::Crypto(e.to_string()))?;
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);
        let ciphertext =
            cipher.encrypt(&nonce, plaintext).map_err(|e| CredentialError::Crypto(e.to_string()))?;
        let mut sealed = nonce_bytes.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CredentialError> {
        if sealed.len() < 12 {
            return Err(CredentialError::Crypto("Sealed blob too short to contain a nonce".into()));
        }
        let cipher =
            Aes256Gcm::new_from_slice(&self.key).map_err(|e| CredentialError::Crypto(e.to_string()))?;
        let (nonce_bytes, ciphertext) = sealed.split_at(12);
        let nonce_array: [u8; 12] =
            nonce_bytes.try_into().map_err(|_| CredentialError::Crypto("Invalid nonce".into()))?;
        let nonce = Nonce::from(nonce_array);
        cipher.decrypt(&nonce, ciphertext).map_err(|e| CredentialError::Crypto(e.to_string()))
    }
}

//-------------------------------------- TokenRefresher      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Some providers rotate the refresh token on every exchange.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Performs the actual OAuth2 token exchange for one provider. Implemented by the connectors crate (a reqwest
/// POST against the provider's token endpoint); the engine only orchestrates when and under which lock it runs.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        provider: &ProviderId,
        material: &SecretMaterial,
    ) -> Result<RefreshedToken, CredentialError>;
}

//-------------------------------------- CredentialManager   ---------------------------------------------------------
#[derive(Clone)]
pub struct CredentialManager<S> {
    store: S,
    sealer: Sealer,
    refreshers: HashMap<ProviderId, Arc<dyn TokenRefresher>>,
    locks: Arc<Mutex<HashMap<ProviderId, Arc<tokio::sync::Mutex<()>>>>>,
    refresh_margin: chrono::Duration,
    refresh_timeout: Duration,
}

impl<S> Debug for CredentialManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialManager")
    }
}

impl<S> CredentialManager<S>
where S: CredentialStore
{
    pub fn new(store: S, sealer: Sealer) -> Self {
        Self {
            store,
            sealer,
            refreshers: HashMap::new(),
            locks: Arc::new(Mutex::new(HashMap::new())),
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    pub fn with_refresher(mut self, provider: ProviderId, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refreshers.insert(provider, refresher);
        self
    }

    pub fn with_refresh_margin(mut self, margin: chrono::Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Seal and store secret material for a provider. Used at provider onboarding and by the refresh routine.
    pub async fn store_material(
        &self,
        provider: &ProviderId,
        material: &SecretMaterial,
        token_expiry: Option<DateTime<Utc>>,
    ) -> Result<(), CredentialError> {
        let plaintext =
            serde_json::to_vec(material).map_err(|e| CredentialError::Crypto(e.to_string()))?;
        let sealed = SealedCredential {
            provider: provider.clone(),
            sealed_material: self.sealer.seal(&plaintext)?,
            token_expiry,
            updated_at: Utc::now(),
        };
        self.store.upsert_credential(&sealed).await
    }

    /// Fetch a credential that is valid right now. Static keys pass straight through; OAuth2 credentials at or
    /// near expiry are refreshed first, single-flight per provider.
    pub async fn get_valid_credential(&self, provider: &ProviderId) -> Result<Credential, CredentialError> {
        let (material, expiry) = self.fetch_material(provider).await?;
        match &material {
            SecretMaterial::ApiKey { .. } => Ok(Credential { provider: provider.clone(), material }),
            SecretMaterial::OAuth2 { .. } => {
                if self.is_fresh(expiry) {
                    return Ok(Credential { provider: provider.clone(), material });
                }
                debug!("🔑️ Access token for {provider} is stale or missing an expiry. Refreshing.");
                self.refresh_single_flight(provider).await
            },
        }
    }

    /// The webhook-signing secret for a provider. Available regardless of token freshness.
    pub async fn webhook_secret(&self, provider: &ProviderId) -> Result<String, CredentialError> {
        let (material, _) = self.fetch_material(provider).await?;
        Ok(material.webhook_secret().to_string())
    }

    async fn fetch_material(
        &self,
        provider: &ProviderId,
    ) -> Result<(SecretMaterial, Option<DateTime<Utc>>), CredentialError> {
        let sealed = self
            .store
            .fetch_credential(provider)
            .await?
            .ok_or_else(|| CredentialError::NotFound(provider.clone()))?;
        let plaintext = self.sealer.open(&sealed.sealed_material)?;
        let material =
            serde_json::from_slice(&plaintext).map_err(|e| CredentialError::Crypto(e.to_string()))?;
        Ok((material, sealed.token_expiry))
    }

    fn is_fresh(&self, expiry: Option<DateTime<Utc>>) -> bool {
        match expiry {
            Some(t) => t - self.refresh_margin > Utc::now(),
            None => false,
        }
    }

    async fn refresh_single_flight(&self, provider: &ProviderId) -> Result<Credential, CredentialError> {
        let lock = self.lock_for(provider);
        let guard = tokio::time::timeout(self.refresh_timeout, lock.lock()).await.map_err(|_| {
            warn!("🔑️ Timed out waiting for an in-flight token refresh for {provider}");
            CredentialError::RefreshFailed(format!("Timed out waiting for token refresh for {provider}"))
        })?;
        // Double-check under the lock: a waiter wakes up to a token the winner already refreshed.
        let (material, expiry) = self.fetch_material(provider).await?;
        if self.is_fresh(expiry) {
            trace!("🔑️ Token for {provider} was refreshed while we waited");
            return Ok(Credential { provider: provider.clone(), material });
        }
        let refresher = self
            .refreshers
            .get(provider)
            .ok_or_else(|| CredentialError::RefreshUnsupported(provider.clone()))?;
        let refreshed = tokio::time::timeout(self.refresh_timeout, refresher.refresh(provider, &material))
            .await
            .map_err(|_| CredentialError::RefreshFailed(format!("Token endpoint for {provider} timed out")))??;
        let new_material = match material {
            SecretMaterial::OAuth2 { client_id, client_secret, refresh_token, webhook_secret, .. } => {
                SecretMaterial::OAuth2 {
                    client_id,
                    client_secret,
                    access_token: refreshed.access_token,
                    refresh_token: refreshed.refresh_token.unwrap_or(refresh_token),
                    webhook_secret,
                }
            },
            SecretMaterial::ApiKey { .. } => {
                // Static keys never reach here; guard anyway.
                return Err(CredentialError::RefreshUnsupported(provider.clone()));
            },
        };
        self.store_material(provider, &new_material, Some(refreshed.expires_at)).await?;
        info!("🔑️ Refreshed access token for {provider}, valid until {}", refreshed.expires_at);
        drop(guard);
        Ok(Credential { provider: provider.clone(), material: new_material })
    }

    fn lock_for(&self, provider: &ProviderId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("credential lock table poisoned");
        locks.entry(provider.clone()).or_default().clone()
    }
}

//-------------------------------------- CredentialError     ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("No credential is stored for provider {0}")]
    NotFound(ProviderId),
    #[error("Could not refresh the access token: {0}")]
    RefreshFailed(String),
    #[error("Provider {0} has no token refresher registered")]
    RefreshUnsupported(ProviderId),
    #[error("Credential sealing error: {0}")]
    Crypto(String),
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for CredentialError {
    fn from(e: sqlx::Error) -> Self {
        CredentialError::DatabaseError(e.to_string())
    }
}
