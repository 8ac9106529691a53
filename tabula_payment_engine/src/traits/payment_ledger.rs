use chrono::Duration;
use thiserror::Error;

use crate::db_types::{
    AttemptOutcome,
    IntentId,
    IntentStatus,
    NewPaymentIntent,
    PaymentIntent,
    ProviderAttempt,
    ProviderId,
};

/// The durable transaction ledger: the single source of truth for "has this order been charged".
///
/// Single-writer semantics per intent are enforced by optimistic versioning, not by locks: every mutation goes
/// through [`Self::cas_update`] and is rejected when the caller's expected version is stale. Losing writers
/// re-read and decide whether their transition is still applicable. Unrelated intents never contend.
#[allow(async_fn_in_trait)]
pub trait PaymentLedger: Clone + Send + Sync {
    /// The URL of the backing store.
    fn url(&self) -> &str;

    /// Idempotent create. If an intent with this id already exists and is equivalent (same order, amount and
    /// currency), the existing row is returned with `false`. A matching id with different charge details is a
    /// client programming error and fails with [`LedgerError::IntentConflict`].
    async fn create_intent(&self, intent: NewPaymentIntent) -> Result<(PaymentIntent, bool), LedgerError>;

    async fn fetch_intent(&self, id: &IntentId) -> Result<Option<PaymentIntent>, LedgerError>;

    /// Compare-and-swap state transition. Applies `update` and increments `version` in a single guarded write
    /// if and only if the stored version equals `expected_version`. On conflict the fresh row is returned so
    /// the loser can re-read without a second round trip.
    async fn cas_update(
        &self,
        id: &IntentId,
        expected_version: i64,
        update: IntentUpdate,
    ) -> Result<CasOutcome, LedgerError>;

    /// Opens a provider attempt row and assigns it a merchant reference (`"{intent_id}/{seq}"`). Called
    /// immediately before the adapter call, so the reference-to-intent mapping is durable even if the process
    /// dies mid-call or the synchronous response is lost.
    async fn insert_attempt(&self, intent_id: &IntentId, provider: &ProviderId)
        -> Result<ProviderAttempt, LedgerError>;

    /// Closes an attempt row with its outcome. Attempts are append-only: a closed attempt is never reopened
    /// or rewritten.
    async fn complete_attempt(
        &self,
        attempt_id: i64,
        outcome: AttemptOutcome,
        provider_reference: Option<&str>,
        raw_code: Option<&str>,
    ) -> Result<ProviderAttempt, LedgerError>;

    async fn attempts_for_intent(&self, id: &IntentId) -> Result<Vec<ProviderAttempt>, LedgerError>;

    /// Resolves an incoming webhook to an intent, by the provider's transaction reference or by the merchant
    /// reference we handed out at attempt start. Either is sufficient.
    async fn intent_id_for_webhook(
        &self,
        provider: &ProviderId,
        provider_reference: Option<&str>,
        attempt_ref: Option<&str>,
    ) -> Result<Option<IntentId>, LedgerError>;

    /// Closes attempt rows that were opened longer than `older_than` ago and never finished (the process died
    /// between opening the row and the adapter returning). They are marked `Timeout`; if the charge actually
    /// went through, the provider's webhook will still upgrade the intent later.
    async fn sweep_stale_attempts(&self, older_than: Duration) -> Result<Vec<ProviderAttempt>, LedgerError>;

    /// Closes the backing store.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

//--------------------------------------    IntentUpdate     ---------------------------------------------------------
/// The set of field changes one CAS transition may carry. Fields left `None` are untouched.
#[derive(Debug, Clone, Default)]
pub struct IntentUpdate {
    pub status: Option<IntentStatus>,
    pub chosen_provider: Option<ProviderId>,
    pub provider_reference: Option<String>,
    /// Appends the provider to `attempted_providers` (no-op if already present) and bumps the attempt count.
    pub mark_attempted: Option<ProviderId>,
}

impl IntentUpdate {
    pub fn status(status: IntentStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    pub fn with_chosen_provider(mut self, provider: ProviderId) -> Self {
        self.chosen_provider = Some(provider);
        self
    }

    pub fn with_provider_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.provider_reference = Some(reference.into());
        self
    }

    pub fn with_mark_attempted(mut self, provider: ProviderId) -> Self {
        self.mark_attempted = Some(provider);
        self
    }
}

//--------------------------------------     CasOutcome      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// The transition was applied; the row as written (version already incremented).
    Applied(PaymentIntent),
    /// Someone else won the version race; the fresh row for the loser to re-evaluate.
    Conflict(PaymentIntent),
}

impl CasOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, CasOutcome::Applied(_))
    }

    pub fn intent(&self) -> &PaymentIntent {
        match self {
            CasOutcome::Applied(i) | CasOutcome::Conflict(i) => i,
        }
    }
}

//--------------------------------------    LedgerError      ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Intent {0} already exists with different order, amount or currency")]
    IntentConflict(IntentId),
    #[error("The requested intent {0} does not exist")]
    IntentNotFound(IntentId),
    #[error("The requested attempt (internal id {0}) does not exist")]
    AttemptNotFound(i64),
    #[error("Attempt {0} is already closed and cannot be written again")]
    AttemptAlreadyClosed(i64),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
