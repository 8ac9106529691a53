use serde::{Deserialize, Serialize};
use tab_common::Money;

use crate::db_types::{CardOrigin, Channel, FeeBreakdown, IntentId, IntentStatus, ProviderId};

//--------------------------------------   ChargeRequest     ---------------------------------------------------------
/// One logical "charge this amount" request. Safe to submit any number of times with the same `intent_id`.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub intent_id: IntentId,
    pub order_id: String,
    pub amount: Money,
    pub currency: String,
    pub channel: Channel,
    pub card_origin: CardOrigin,
    /// Caller-preferred provider ordering. When absent, cheapest-fee-first applies.
    pub preferred_providers: Option<Vec<ProviderId>>,
}

//--------------------------------------   PaymentResult     ---------------------------------------------------------
/// The single, user-presentable outcome of a charge. Per-attempt provider errors are internal; only the final
/// terminal outcome (plus a recommendation) is surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResult {
    pub intent_id: IntentId,
    pub status: IntentStatus,
    pub provider: Option<ProviderId>,
    pub provider_reference: Option<String>,
    pub fee_breakdown: Option<FeeBreakdown>,
    pub failure: Option<FailureReason>,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The card itself was rejected. Trying another provider would not help.
    Declined,
    /// Every eligible provider was tried and none could take the charge.
    AllProvidersExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Nothing for the customer to do.
    None,
    /// Transient trouble on our side; the same card can be retried shortly.
    Retry,
    /// The payment instrument was rejected; the customer should pay differently.
    TryAnotherMethod,
}
