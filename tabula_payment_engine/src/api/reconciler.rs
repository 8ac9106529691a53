use log::*;

use crate::{
    api::{errors::ReconcileError, registry::AdapterRegistry},
    db_types::{IntentStatus, PaymentIntent, ProviderId},
    events::{EventProducers, PaymentCapturedEvent, PaymentFailedEvent},
    traits::{CasOutcome, CredentialStore, IntentUpdate, PaymentLedger, WebhookEvent, WebhookKind},
    CredentialManager,
};

//-------------------------------------- ReconcileOutcome    ---------------------------------------------------------
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The webhook moved the intent to a new state.
    Applied(PaymentIntent),
    /// Duplicate or late delivery; the intent was already where the webhook says. Providers redeliver freely,
    /// so this is the common case, not an error.
    AlreadyApplied(PaymentIntent),
    /// Authentic, but outranked by what the ledger already knows (a failure report about money that was in
    /// fact captured). Dropped without effect.
    Superseded(PaymentIntent),
}

impl ReconcileOutcome {
    pub fn intent(&self) -> &PaymentIntent {
        match self {
            ReconcileOutcome::Applied(i) | ReconcileOutcome::AlreadyApplied(i) | ReconcileOutcome::Superseded(i) => i,
        }
    }
}

//--------------------------------------  ReconcilerApi      ---------------------------------------------------------
/// The asynchronous confirmation path: merges provider webhooks into the ledger.
///
/// Webhooks race the synchronous charge path and arrive at-least-once, out of order, and sometimes about
/// transactions the synchronous path has already given up on. All of that is resolved through the same
/// compare-and-swap the orchestrator uses: re-read on conflict, and drop the webhook once the ledger already
/// reflects it or outranks it. The one transition that is never dropped is Captured — the provider saying
/// "the money moved" beats a local Failed verdict, because the timeout that produced the Failed only proves we
/// did not hear the answer, not that there was none.
pub struct ReconcilerApi<B, S> {
    ledger: B,
    adapters: AdapterRegistry,
    credentials: CredentialManager<S>,
    producers: EventProducers,
}

impl<B, S> ReconcilerApi<B, S>
where
    B: PaymentLedger,
    S: CredentialStore,
{
    pub fn new(ledger: B, adapters: AdapterRegistry, credentials: CredentialManager<S>, producers: EventProducers) -> Self {
        Self { ledger, adapters, credentials, producers }
    }

    pub fn ledger(&self) -> &B {
        &self.ledger
    }

    /// Verify, decode and merge one webhook delivery. Verification comes first: an unauthenticated payload is
    /// rejected before a single byte of it is interpreted.
    pub async fn handle(
        &self,
        provider: &ProviderId,
        payload: &[u8],
        signature: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let adapter =
            self.adapters.get(provider).ok_or_else(|| ReconcileError::UnknownProvider(provider.clone()))?;
        let secret = self.credentials.webhook_secret(provider).await?;
        if !adapter.verify_webhook_signature(payload, signature, &secret) {
            warn!("🔁️ Webhook from {provider} failed signature verification. Dropping it.");
            return Err(ReconcileError::VerificationFailed(provider.clone()));
        }
        let event = adapter.parse_webhook(payload).map_err(|e| ReconcileError::MalformedPayload(e.to_string()))?;
        self.apply(provider, event).await
    }

    /// Merge an already-verified, already-decoded event. Split out so connectors with bespoke transports can
    /// feed events in directly.
    pub async fn apply(
        &self,
        provider: &ProviderId,
        event: WebhookEvent,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let intent_id = self
            .ledger
            .intent_id_for_webhook(provider, event.provider_reference.as_deref(), event.attempt_ref.as_deref())
            .await?
            .ok_or(ReconcileError::UnknownReference)?;
        let mut intent =
            self.ledger.fetch_intent(&intent_id).await?.ok_or(ReconcileError::UnknownReference)?;
        debug!(
            "🔁️ Webhook from {provider}: {:?} for intent [{intent_id}] (currently {} v{})",
            event.kind, intent.status, intent.version
        );
        loop {
            let Some(update) = merge_update(&intent, &event, provider) else {
                return Ok(settled_outcome(intent, &event));
            };
            match self.ledger.cas_update(&intent.id, intent.version, update).await? {
                CasOutcome::Applied(next) => {
                    info!(
                        "🔁️ Webhook from {provider} moved intent [{}] from {} to {}",
                        next.id, intent.status, next.status
                    );
                    match next.status {
                        IntentStatus::Captured => self.call_payment_captured_hook(&next).await,
                        IntentStatus::Failed => self.call_payment_failed_hook(&next).await,
                        _ => {},
                    }
                    return Ok(ReconcileOutcome::Applied(next));
                },
                CasOutcome::Conflict(next) => {
                    // The synchronous path (or a concurrent delivery) moved the row. Re-decide on fresh state.
                    trace!("🔁️ Version race on intent [{}]; re-reading", next.id);
                    intent = next;
                },
            }
        }
    }

    async fn call_payment_captured_hook(&self, intent: &PaymentIntent) {
        for producer in &self.producers.payment_captured_producer {
            producer.publish_event(PaymentCapturedEvent::new(intent.clone())).await;
        }
    }

    async fn call_payment_failed_hook(&self, intent: &PaymentIntent) {
        for producer in &self.producers.payment_failed_producer {
            producer.publish_event(PaymentFailedEvent::new(intent.clone())).await;
        }
    }
}

/// Decide what (if anything) this event changes about the intent. `None` means the ledger already reflects or
/// outranks the event.
fn merge_update(intent: &PaymentIntent, event: &WebhookEvent, provider: &ProviderId) -> Option<IntentUpdate> {
    match event.kind {
        WebhookKind::Captured => match intent.status {
            // Already at (or past) captured.
            IntentStatus::Captured | IntentStatus::Refunding | IntentStatus::Refunded => None,
            // Everything else upgrades, including a local Failed verdict: the money moved.
            _ => {
                let mut update =
                    IntentUpdate::status(IntentStatus::Captured).with_chosen_provider(provider.clone());
                if let Some(r) = &event.provider_reference {
                    update = update.with_provider_reference(r.clone());
                }
                Some(update)
            },
        },
        WebhookKind::Failed => match intent.status {
            // A failure report never demotes a state where money moved.
            IntentStatus::Captured | IntentStatus::Refunding | IntentStatus::Refunded | IntentStatus::Failed => None,
            _ => Some(IntentUpdate::status(IntentStatus::Failed)),
        },
        WebhookKind::Refunded => match intent.status {
            IntentStatus::Refunded => None,
            _ => Some(IntentUpdate::status(IntentStatus::Refunded)),
        },
    }
}

fn settled_outcome(intent: PaymentIntent, event: &WebhookEvent) -> ReconcileOutcome {
    let already = match (&event.kind, intent.status) {
        (WebhookKind::Captured, IntentStatus::Captured | IntentStatus::Refunding | IntentStatus::Refunded) => true,
        (WebhookKind::Failed, IntentStatus::Failed) => true,
        (WebhookKind::Refunded, IntentStatus::Refunded) => true,
        _ => false,
    };
    if already {
        debug!("🔁️ Intent [{}] already reflects this webhook. Nothing to do.", intent.id);
        ReconcileOutcome::AlreadyApplied(intent)
    } else {
        debug!("🔁️ Intent [{}] ({}) outranks this webhook. Dropping it.", intent.id, intent.status);
        ReconcileOutcome::Superseded(intent)
    }
}
