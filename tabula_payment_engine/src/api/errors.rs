use thiserror::Error;

use crate::{
    credentials::CredentialError,
    db_types::{IntentId, IntentStatus, ProviderId},
    traits::LedgerError,
};

//-------------------------------------- OrchestratorError   ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    /// The same intent id was submitted with a different order, amount or currency. A client programming
    /// error; no provider is ever contacted.
    #[error("Intent {0} already exists with different charge details")]
    IntentConflict(IntentId),
    #[error("The requested intent {0} does not exist")]
    IntentNotFound(IntentId),
    #[error("No adapter is registered for provider {0}")]
    UnknownProvider(ProviderId),
    #[error("Ledger error: {0}")]
    LedgerError(LedgerError),
    #[error("Credential error: {0}")]
    CredentialError(#[from] CredentialError),
    #[error("Intent {0} is {1}, refunds require a captured payment")]
    NotRefundable(IntentId, IntentStatus),
    #[error("Only full refunds are supported; the refund amount must equal the captured amount")]
    PartialRefundUnsupported,
    #[error("The refund could not be completed: {0}")]
    RefundFailed(String),
    /// A row violated an invariant the state machine relies on (e.g. an authorized intent with no provider
    /// reference). Indicates a bug or manual ledger edits, never a user error.
    #[error("Invariant violation in the payment flow: {0}")]
    Internal(String),
}

impl From<LedgerError> for OrchestratorError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::IntentConflict(id) => OrchestratorError::IntentConflict(id),
            LedgerError::IntentNotFound(id) => OrchestratorError::IntentNotFound(id),
            e => OrchestratorError::LedgerError(e),
        }
    }
}

//--------------------------------------  ReconcileError     ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// The signature did not verify. A security event: the payload is dropped and never applied.
    #[error("Webhook signature verification failed for provider {0}")]
    VerificationFailed(ProviderId),
    #[error("No adapter is registered for provider {0}")]
    UnknownProvider(ProviderId),
    #[error("Could not interpret the webhook payload: {0}")]
    MalformedPayload(String),
    #[error("The webhook references a transaction this ledger has never seen")]
    UnknownReference,
    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),
    #[error("Credential error: {0}")]
    CredentialError(#[from] CredentialError),
}
