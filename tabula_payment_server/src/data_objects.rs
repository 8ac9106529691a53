use serde::{Deserialize, Serialize};
use tab_common::Money;
use tabula_payment_engine::db_types::{CardOrigin, Channel, ProviderId};

/// The body of a `POST /payments/{intent_id}` request. The intent id lives in the path so that retries of the
/// same URL are idempotent by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeParams {
    pub order_id: String,
    /// Amount in minor currency units (cents).
    pub amount: Money,
    pub currency: String,
    pub channel: Channel,
    pub card_origin: CardOrigin,
    /// Optional provider ordering. When absent, cheapest-fee-first applies.
    #[serde(default)]
    pub preferred_providers: Option<Vec<ProviderId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundParams {
    /// Amount in minor currency units. Must equal the captured amount; partial refunds are rejected.
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self { success: false, message: message.into() }
    }
}
