use std::time::Duration;

use log::*;
use tab_common::Money;

use crate::{
    api::{
        errors::OrchestratorError,
        payment_objects::{ChargeRequest, FailureReason, PaymentResult, Recommendation},
        registry::AdapterRegistry,
    },
    circuit::CircuitBreaker,
    db_types::{
        AttemptOutcome,
        IntentId,
        IntentStatus,
        NewPaymentIntent,
        PaymentIntent,
        ProviderAttempt,
        ProviderId,
    },
    events::{EventProducers, PaymentCapturedEvent, PaymentFailedEvent},
    fees::FeeSchedule,
    traits::{AdapterResult, AuthorizeRequest, CasOutcome, CredentialStore, IntentUpdate, PaymentLedger},
    CredentialManager,
};

const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_PROVIDER_ATTEMPTS: i64 = 3;

//-------------------------------------- OrchestratorConfig  ---------------------------------------------------------
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Hard ceiling on one synchronous provider call, enforced on our side regardless of what the adapter's
    /// HTTP client does.
    pub provider_timeout: Duration,
    /// Cap on distinct providers tried for one intent before it fails terminally.
    pub max_provider_attempts: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { provider_timeout: DEFAULT_PROVIDER_TIMEOUT, max_provider_attempts: DEFAULT_MAX_PROVIDER_ATTEMPTS }
    }
}

//-------------------------------------- OrchestratorApi     ---------------------------------------------------------
/// The synchronous payment flow: charge an order, fail over between providers, refund a captured payment.
///
/// Every state transition goes through the ledger's compare-and-swap, so this API can run on any number of
/// terminals concurrently, and races against the webhook reconciler resolve to exactly one winner per
/// transition. A lost race is never an error here: the loser re-reads and either finds its work already done or
/// carries on from the fresh state.
pub struct OrchestratorApi<B, S> {
    ledger: B,
    credentials: CredentialManager<S>,
    adapters: AdapterRegistry,
    fees: FeeSchedule,
    breaker: CircuitBreaker,
    config: OrchestratorConfig,
    producers: EventProducers,
}

impl<B, S> Clone for OrchestratorApi<B, S>
where
    B: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            credentials: self.credentials.clone(),
            adapters: self.adapters.clone(),
            fees: self.fees.clone(),
            breaker: self.breaker.clone(),
            config: self.config,
            producers: self.producers.clone(),
        }
    }
}

impl<B, S> OrchestratorApi<B, S>
where
    B: PaymentLedger,
    S: CredentialStore,
{
    pub fn new(
        ledger: B,
        credentials: CredentialManager<S>,
        adapters: AdapterRegistry,
        fees: FeeSchedule,
        breaker: CircuitBreaker,
        producers: EventProducers,
    ) -> Self {
        Self { ledger, credentials, adapters, fees, breaker, config: OrchestratorConfig::default(), producers }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ledger(&self) -> &B {
        &self.ledger
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Charge an order. Safe to call any number of times with the same intent id: an intent that already
    /// reached a terminal state returns the stored outcome without touching any provider.
    ///
    /// Drives the intent forward until it is terminal or until nothing more can be done synchronously (an
    /// authorized charge whose capture call failed waits for the provider's webhook; an attempt left in flight
    /// by another worker is not duplicated).
    pub async fn charge(&self, req: ChargeRequest) -> Result<PaymentResult, OrchestratorError> {
        let new_intent = NewPaymentIntent {
            id: req.intent_id.clone(),
            order_id: req.order_id.clone(),
            amount: req.amount,
            currency: req.currency.clone(),
            channel: req.channel,
            card_origin: req.card_origin,
        };
        let (mut intent, created) = self.ledger.create_intent(new_intent).await?;
        if created {
            info!(
                "🎛️💳️ New intent [{}] for order {}: {} {} via {}/{}",
                intent.id, intent.order_id, intent.amount, intent.currency, intent.channel, intent.card_origin
            );
        } else {
            debug!("🎛️💳️ Intent [{}] resubmitted; resuming from {} (v{})", intent.id, intent.status, intent.version);
        }
        loop {
            if intent.status.is_terminal() {
                return self.result_for(&intent).await;
            }
            intent = match intent.status {
                IntentStatus::Created => self.drive_next_attempt(intent, &req).await?,
                IntentStatus::Authorizing => {
                    if self.has_open_attempt(&intent.id).await? {
                        debug!("🎛️💳️ Intent [{}] has a provider call in flight elsewhere. Not duplicating it.", intent.id);
                        return self.result_for(&intent).await;
                    }
                    // The in-flight attempt was closed (worker died, sweep cleaned up). Resume selection from
                    // where it stood.
                    self.drive_next_attempt(intent, &req).await?
                },
                IntentStatus::Authorized => {
                    let (next, progressed) = self.drive_capture(intent).await?;
                    if !progressed {
                        return self.result_for(&next).await;
                    }
                    next
                },
                IntentStatus::Refunding => {
                    // A refund is in flight on another worker; report the current state.
                    return self.result_for(&intent).await;
                },
                // Terminal states returned above.
                IntentStatus::Captured | IntentStatus::Failed | IntentStatus::Refunded | IntentStatus::Cancelled => {
                    return self.result_for(&intent).await;
                },
            };
        }
    }

    /// Read-only view of an intent, condensed into the same shape [`Self::charge`] returns. Never contacts a
    /// provider and never writes.
    pub async fn status(&self, intent_id: &IntentId) -> Result<PaymentResult, OrchestratorError> {
        let intent = self
            .ledger
            .fetch_intent(intent_id)
            .await?
            .ok_or_else(|| OrchestratorError::IntentNotFound(intent_id.clone()))?;
        self.result_for(&intent).await
    }

    /// Return a captured payment in full. Partial refunds are not supported; the refund amount must equal the
    /// captured amount. Refunding an already-refunded intent is an idempotent no-op.
    pub async fn refund(&self, intent_id: &IntentId, amount: Money) -> Result<PaymentResult, OrchestratorError> {
        let intent = self
            .ledger
            .fetch_intent(intent_id)
            .await?
            .ok_or_else(|| OrchestratorError::IntentNotFound(intent_id.clone()))?;
        match intent.status {
            IntentStatus::Refunded => return self.result_for(&intent).await,
            IntentStatus::Captured => {},
            status => return Err(OrchestratorError::NotRefundable(intent_id.clone(), status)),
        }
        if amount != intent.amount {
            return Err(OrchestratorError::PartialRefundUnsupported);
        }
        let provider = intent
            .chosen_provider
            .clone()
            .ok_or_else(|| OrchestratorError::Internal(format!("Captured intent [{intent_id}] has no provider")))?;
        let reference = intent.provider_reference.clone().ok_or_else(|| {
            OrchestratorError::Internal(format!("Captured intent [{intent_id}] has no provider reference"))
        })?;
        let adapter =
            self.adapters.get(&provider).ok_or_else(|| OrchestratorError::UnknownProvider(provider.clone()))?;
        let credential = self.credentials.get_valid_credential(&provider).await?;
        let (working, applied) = self.cas(&intent, IntentUpdate::status(IntentStatus::Refunding)).await?;
        if !applied {
            // Someone else got there first; report whatever state they left.
            return self.result_for(&working).await;
        }
        info!("🎛️💸️ Refunding {} {} on intent [{intent_id}] via {provider}", amount, working.currency);
        let call = adapter.refund(&reference, amount, &credential);
        match tokio::time::timeout(self.config.provider_timeout, call).await {
            Ok(Ok(r)) if r.outcome == AttemptOutcome::Success => {
                let (done, _) = self.cas(&working, IntentUpdate::status(IntentStatus::Refunded)).await?;
                info!("🎛️💸️ Intent [{intent_id}] refunded in full");
                self.result_for(&done).await
            },
            outcome => {
                let reason = match outcome {
                    Ok(Ok(r)) => format!("provider answered {}", r.outcome),
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => "the refund call timed out".to_string(),
                };
                warn!("🎛️💸️ Refund of intent [{intent_id}] via {provider} did not complete: {reason}");
                // Roll back so the refund can be retried.
                let (rolled_back, applied) = self.cas(&working, IntentUpdate::status(IntentStatus::Captured)).await?;
                if !applied {
                    // A webhook settled the intent while we were rolling back; its verdict stands.
                    warn!(
                        "🎛️💸️ Intent [{intent_id}] moved to {} during the refund rollback",
                        rolled_back.status
                    );
                }
                Err(OrchestratorError::RefundFailed(reason))
            },
        }
    }

    /// Pick the next provider and run one full attempt against it. Returns the intent to continue from; the
    /// caller's loop decides what happens next based on its status.
    async fn drive_next_attempt(
        &self,
        intent: PaymentIntent,
        req: &ChargeRequest,
    ) -> Result<PaymentIntent, OrchestratorError> {
        let candidates = self.selection_order(&intent, req.preferred_providers.as_deref());
        if candidates.is_empty() || intent.provider_attempt_count >= self.config.max_provider_attempts {
            info!(
                "🎛️💳️ Intent [{}]: no eligible providers left after {} attempt(s). Failing terminally.",
                intent.id, intent.provider_attempt_count
            );
            let (next, applied) = self.cas(&intent, IntentUpdate::status(IntentStatus::Failed)).await?;
            if applied {
                self.call_payment_failed_hook(&next).await;
            }
            return Ok(next);
        }
        let provider = candidates[0].clone();
        let adapter =
            self.adapters.get(&provider).ok_or_else(|| OrchestratorError::UnknownProvider(provider.clone()))?;
        // Claim the attempt slot before anything irreversible happens.
        let update = IntentUpdate::status(IntentStatus::Authorizing).with_chosen_provider(provider.clone());
        let (next, applied) = self.cas(&intent, update).await?;
        if !applied {
            return Ok(next);
        }
        let intent = next;
        // The attempt row (and its merchant reference) is durable before the provider hears from us, so a
        // webhook can always be matched back even if we die mid-call.
        let attempt = self.ledger.insert_attempt(&intent.id, &provider).await?;
        debug!("🎛️💳️ Intent [{}]: attempt {} via {provider}", intent.id, attempt.attempt_ref);
        let credential = match self.credentials.get_valid_credential(&provider).await {
            Ok(c) => c,
            Err(e) => {
                warn!("🎛️💳️ No usable credential for {provider}: {e}. Failing over.");
                self.ledger
                    .complete_attempt(attempt.id, AttemptOutcome::Error, None, Some("credential_unavailable"))
                    .await?;
                self.breaker.record_error(&provider);
                let update = IntentUpdate::status(IntentStatus::Created).with_mark_attempted(provider);
                let (next, _) = self.cas(&intent, update).await?;
                return Ok(next);
            },
        };
        let auth_req = AuthorizeRequest {
            amount: intent.amount,
            currency: intent.currency.clone(),
            idempotency_key: intent.id.clone(),
            attempt_ref: attempt.attempt_ref.clone(),
        };
        let call = adapter.authorize(&auth_req, &credential);
        let result = match tokio::time::timeout(self.config.provider_timeout, call).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                debug!("🎛️💳️ {provider} call on intent [{}] failed: {e}", intent.id);
                AdapterResult { outcome: e.as_outcome(), provider_reference: None, raw_code: Some(e.to_string()) }
            },
            Err(_) => {
                debug!("🎛️💳️ {provider} did not answer for intent [{}] within the call budget", intent.id);
                AdapterResult {
                    outcome: AttemptOutcome::Timeout,
                    provider_reference: None,
                    raw_code: Some("orchestrator_timeout".to_string()),
                }
            },
        };
        self.ledger
            .complete_attempt(attempt.id, result.outcome, result.provider_reference.as_deref(), result.raw_code.as_deref())
            .await?;
        match result.outcome {
            AttemptOutcome::Success => {
                self.breaker.record_success(&provider);
                let target =
                    if adapter.separate_capture() { IntentStatus::Authorized } else { IntentStatus::Captured };
                let mut update = IntentUpdate::status(target);
                if let Some(r) = &result.provider_reference {
                    update = update.with_provider_reference(r.clone());
                }
                let (next, applied) = self.cas(&intent, update).await?;
                if applied && next.status == IntentStatus::Captured {
                    info!("🎛️💳️ Intent [{}] captured via {provider}", next.id);
                    self.call_payment_captured_hook(&next).await;
                }
                Ok(next)
            },
            AttemptOutcome::Declined => {
                // The provider did its job; the card is the problem. Terminal, and no failover: another
                // provider would decline the same card.
                self.breaker.record_success(&provider);
                info!("🎛️💳️ Intent [{}] declined by {provider} ({:?})", intent.id, result.raw_code);
                let (next, applied) = self.cas(&intent, IntentUpdate::status(IntentStatus::Failed)).await?;
                if applied {
                    self.call_payment_failed_hook(&next).await;
                }
                Ok(next)
            },
            AttemptOutcome::Timeout | AttemptOutcome::Error => {
                self.breaker.record_error(&provider);
                info!("🎛️💳️ Intent [{}]: {provider} is unavailable ({}). Failing over.", intent.id, result.outcome);
                let update = IntentUpdate::status(IntentStatus::Created).with_mark_attempted(provider);
                let (next, _) = self.cas(&intent, update).await?;
                Ok(next)
            },
        }
    }

    /// Issue the capture for an authorized two-step charge. The boolean is false when the intent did not move
    /// (capture failed or timed out); the funds stay reserved and the provider's webhook completes the story.
    async fn drive_capture(&self, intent: PaymentIntent) -> Result<(PaymentIntent, bool), OrchestratorError> {
        let provider = intent
            .chosen_provider
            .clone()
            .ok_or_else(|| OrchestratorError::Internal(format!("Authorized intent [{}] has no provider", intent.id)))?;
        let reference = intent.provider_reference.clone().ok_or_else(|| {
            OrchestratorError::Internal(format!("Authorized intent [{}] has no provider reference", intent.id))
        })?;
        let adapter =
            self.adapters.get(&provider).ok_or_else(|| OrchestratorError::UnknownProvider(provider.clone()))?;
        let credential = self.credentials.get_valid_credential(&provider).await?;
        let call = adapter.capture(&reference, intent.amount, &credential);
        match tokio::time::timeout(self.config.provider_timeout, call).await {
            Ok(Ok(r)) if r.outcome == AttemptOutcome::Success => {
                self.breaker.record_success(&provider);
                let (next, applied) = self.cas(&intent, IntentUpdate::status(IntentStatus::Captured)).await?;
                if applied {
                    info!("🎛️💳️ Intent [{}] captured via {provider}", next.id);
                    self.call_payment_captured_hook(&next).await;
                }
                Ok((next, true))
            },
            outcome => {
                let reason = match outcome {
                    Ok(Ok(r)) => format!("provider answered {}", r.outcome),
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => "the capture call timed out".to_string(),
                };
                warn!(
                    "🎛️💳️ Capture of intent [{}] via {provider} did not complete: {reason}. The funds stay \
                     reserved; the provider's webhook will finish the job.",
                    intent.id
                );
                self.breaker.record_error(&provider);
                Ok((intent, false))
            },
        }
    }

    /// The providers still worth trying, best first: the caller's preference order when given, otherwise
    /// cheapest fee first; minus providers already exhausted for this intent, providers with no adapter or no
    /// rate card for this channel/origin, and providers with an open circuit breaker.
    fn selection_order(&self, intent: &PaymentIntent, preferred: Option<&[ProviderId]>) -> Vec<ProviderId> {
        let base = match preferred {
            Some(list) if !list.is_empty() => list.to_vec(),
            _ => self.fees.rank_by_cost(intent.amount, intent.channel, intent.card_origin),
        };
        base.into_iter()
            .filter(|p| !intent.attempted_providers.contains(p))
            .filter(|p| self.adapters.contains(p))
            .filter(|p| self.fees.quote(p, intent.amount, intent.channel, intent.card_origin).is_some())
            .filter(|p| !self.breaker.is_open(p))
            .collect()
    }

    async fn has_open_attempt(&self, intent_id: &IntentId) -> Result<bool, OrchestratorError> {
        let attempts = self.ledger.attempts_for_intent(intent_id).await?;
        Ok(attempts.iter().any(|a| a.finished_at.is_none()))
    }

    /// One CAS transition. `true` means we applied it; `false` means someone else moved the row first and the
    /// returned intent is the fresh state to re-evaluate.
    async fn cas(
        &self,
        intent: &PaymentIntent,
        update: IntentUpdate,
    ) -> Result<(PaymentIntent, bool), OrchestratorError> {
        match self.ledger.cas_update(&intent.id, intent.version, update).await? {
            CasOutcome::Applied(next) => Ok((next, true)),
            CasOutcome::Conflict(next) => {
                debug!(
                    "🎛️💳️ Lost a version race on intent [{}] (expected v{}, found {} v{}). Re-reading.",
                    next.id, intent.version, next.status, next.version
                );
                Ok((next, false))
            },
        }
    }

    /// Condense a terminal (or stuck) intent into the single outcome callers see.
    async fn result_for(&self, intent: &PaymentIntent) -> Result<PaymentResult, OrchestratorError> {
        let failure = if intent.status == IntentStatus::Failed {
            let attempts = self.ledger.attempts_for_intent(&intent.id).await?;
            if declined(&attempts) {
                Some(FailureReason::Declined)
            } else {
                Some(FailureReason::AllProvidersExhausted)
            }
        } else {
            None
        };
        let recommendation = match failure {
            Some(FailureReason::Declined) => Recommendation::TryAnotherMethod,
            Some(FailureReason::AllProvidersExhausted) => Recommendation::Retry,
            None => Recommendation::None,
        };
        let fee_breakdown = match (failure.is_none(), &intent.chosen_provider) {
            (true, Some(p)) => self.fees.quote(p, intent.amount, intent.channel, intent.card_origin),
            _ => None,
        };
        Ok(PaymentResult {
            intent_id: intent.id.clone(),
            status: intent.status,
            provider: intent.chosen_provider.clone(),
            provider_reference: intent.provider_reference.clone(),
            fee_breakdown,
            failure,
            recommendation,
        })
    }

    async fn call_payment_captured_hook(&self, intent: &PaymentIntent) {
        for producer in &self.producers.payment_captured_producer {
            trace!("🎛️💳️ Notifying payment captured hook subscribers for [{}]", intent.id);
            let event = PaymentCapturedEvent::new(intent.clone());
            producer.publish_event(event).await;
        }
    }

    async fn call_payment_failed_hook(&self, intent: &PaymentIntent) {
        for producer in &self.producers.payment_failed_producer {
            trace!("🎛️💳️ Notifying payment failed hook subscribers for [{}]", intent.id);
            let event = PaymentFailedEvent::new(intent.clone());
            producer.publish_event(event).await;
        }
    }
}

fn declined(attempts: &[ProviderAttempt]) -> bool {
    attempts.iter().any(|a| a.outcome == Some(AttemptOutcome::Declined))
}
