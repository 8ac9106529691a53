//! The public orchestration API.
//!
//! [`OrchestratorApi`] drives the synchronous charge/refund state machine; [`ReconcilerApi`] merges
//! asynchronous provider webhooks into the same ledger rows. They coordinate exclusively through
//! compare-and-swap on the intent version, so either path can win any race and the other recovers by
//! re-reading.
mod errors;
mod orchestrator;
mod payment_objects;
mod reconciler;
mod registry;

pub use errors::{OrchestratorError, ReconcileError};
pub use orchestrator::{OrchestratorApi, OrchestratorConfig};
pub use payment_objects::{ChargeRequest, FailureReason, PaymentResult, Recommendation};
pub use reconciler::{ReconcileOutcome, ReconcilerApi};
pub use registry::AdapterRegistry;
