//! `SqliteLedger` is a concrete implementation of the payment engine's storage backend.
//!
//! Unsurprisingly, it uses SQLite, and implements both [`PaymentLedger`] and [`CredentialStore`]. Every write
//! is a single guarded statement rather than a multi-statement transaction: concurrent writers then queue on
//! SQLite's busy handler instead of deadlocking on a deferred lock upgrade, and a compare-and-swap loser is
//! always reported as a [`CasOutcome::Conflict`] with the fresh row, never as a database error.
use std::fmt::Debug;

use chrono::Duration;
use sqlx::SqlitePool;

use super::db::{attempts, credentials, intents, new_pool};
use crate::{
    credentials::CredentialError,
    db_types::{AttemptOutcome, IntentId, NewPaymentIntent, PaymentIntent, ProviderAttempt, ProviderId},
    traits::{CasOutcome, CredentialStore, IntentUpdate, LedgerError, PaymentLedger, SealedCredential},
};

#[derive(Clone)]
pub struct SqliteLedger {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteLedger ({:?})", self.pool)
    }
}

impl SqliteLedger {
    pub async fn new(url: String, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = new_pool(&url, max_connections).await?;
        Ok(Self { url, pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PaymentLedger for SqliteLedger {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_intent(&self, intent: NewPaymentIntent) -> Result<(PaymentIntent, bool), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        intents::idempotent_insert(intent, &mut conn).await
    }

    async fn fetch_intent(&self, id: &IntentId) -> Result<Option<PaymentIntent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        intents::fetch_intent(id, &mut conn).await
    }

    async fn cas_update(
        &self,
        id: &IntentId,
        expected_version: i64,
        update: IntentUpdate,
    ) -> Result<CasOutcome, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        intents::cas_update(id, expected_version, update, &mut conn).await
    }

    async fn insert_attempt(
        &self,
        intent_id: &IntentId,
        provider: &ProviderId,
    ) -> Result<ProviderAttempt, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        attempts::insert_attempt(intent_id, provider, &mut conn).await
    }

    async fn complete_attempt(
        &self,
        attempt_id: i64,
        outcome: AttemptOutcome,
        provider_reference: Option<&str>,
        raw_code: Option<&str>,
    ) -> Result<ProviderAttempt, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        attempts::complete_attempt(attempt_id, outcome, provider_reference, raw_code, &mut conn).await
    }

    async fn attempts_for_intent(&self, id: &IntentId) -> Result<Vec<ProviderAttempt>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        attempts::attempts_for_intent(id, &mut conn).await
    }

    async fn intent_id_for_webhook(
        &self,
        provider: &ProviderId,
        provider_reference: Option<&str>,
        attempt_ref: Option<&str>,
    ) -> Result<Option<IntentId>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(reference) = provider_reference {
            if let Some(id) = intents::intent_id_for_provider_reference(provider, reference, &mut conn).await? {
                return Ok(Some(id));
            }
        }
        if let Some(attempt_ref) = attempt_ref {
            if let Some(id) = attempts::intent_id_for_attempt_ref(attempt_ref, &mut conn).await? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    async fn sweep_stale_attempts(&self, older_than: Duration) -> Result<Vec<ProviderAttempt>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        attempts::sweep_stale_attempts(older_than, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl CredentialStore for SqliteLedger {
    async fn fetch_credential(&self, provider: &ProviderId) -> Result<Option<SealedCredential>, CredentialError> {
        let mut conn = self.pool.acquire().await.map_err(CredentialError::from)?;
        credentials::fetch_credential(provider, &mut conn).await
    }

    async fn upsert_credential(&self, credential: &SealedCredential) -> Result<(), CredentialError> {
        let mut conn = self.pool.acquire().await.map_err(CredentialError::from)?;
        credentials::upsert_credential(credential, &mut conn).await
    }
}
