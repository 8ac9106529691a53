//! Tabula Payment Engine
//!
//! The payment orchestration core of the Tabula point-of-sale platform. A single logical "charge this amount"
//! request is routed to one of several independent external payment processors, with provider-specific fees
//! computed in fixed point, an at-most-once charge guarantee under retries and partial failures, and
//! reconciliation of asynchronous webhook confirmations against the synchronous request path.
//!
//! The library is divided into three main sections:
//! 1. The transaction ledger ([`mod@sqlite`]). The ledger is the single source of truth for "has this order been
//!    charged". All writes go through compare-and-swap on a per-intent version counter; there are no coarse
//!    locks on the hot path. You should never need to access the database directly; use the public API instead.
//!    The exception is the data types stored in the ledger, which are defined in `db_types` and are public.
//! 2. The orchestration API ([`mod@api`]). [`api::OrchestratorApi`] drives the charge state machine and
//!    [`api::ReconcilerApi`] merges webhook confirmations into the same ledger rows. Both are generic over the
//!    [`traits::PaymentLedger`] backend.
//! 3. Provider plumbing: the [`traits::ProviderAdapter`] interface that concrete connectors implement, the
//!    [`credentials::CredentialManager`] that feeds them valid credentials, and the pure [`fees`] calculator.
//!
//! The engine also emits events when payments reach a terminal state. A small hook framework lets the rest of
//! the platform (fulfilment, receipt printing) subscribe to these without coupling to the orchestrator.
pub mod api;
pub mod circuit;
pub mod credentials;
pub mod db_types;
pub mod events;
pub mod fees;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedger;
pub use api::{OrchestratorApi, OrchestratorError, PaymentResult, ReconcilerApi};
pub use credentials::CredentialManager;
pub use traits::{CredentialStore, PaymentLedger, ProviderAdapter};
