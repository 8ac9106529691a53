//! The seams of the payment engine.
//!
//! Backends implement [`PaymentLedger`] and [`CredentialStore`]; concrete payment networks implement
//! [`ProviderAdapter`]. The orchestrator and reconciler are written entirely against these traits, so the
//! whole charge flow can be exercised against throwaway databases and scripted adapters in tests.
mod credential_store;
mod payment_ledger;
mod provider_adapter;

pub use credential_store::{CredentialStore, SealedCredential};
pub use payment_ledger::{CasOutcome, IntentUpdate, LedgerError, PaymentLedger};
pub use provider_adapter::{
    AdapterError,
    AdapterResult,
    AuthorizeRequest,
    ProviderAdapter,
    WebhookEvent,
    WebhookKind,
};
