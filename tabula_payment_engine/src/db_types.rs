use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use tab_common::Money;
use thiserror::Error;

//--------------------------------------      IntentId       ---------------------------------------------------------
/// The caller-supplied identity of a [`PaymentIntent`]. Doubles as the idempotency key: every retry of the same
/// logical charge must carry the same id, and it is forwarded to providers as their idempotency key as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct IntentId(pub String);

impl FromStr for IntentId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for IntentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for IntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl IntentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     ProviderId      ---------------------------------------------------------
/// A lightweight wrapper around the well-known name of a payment provider, e.g. "meridian".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for ProviderId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl ProviderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    IntentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum IntentStatus {
    /// The intent exists in the ledger but no provider has been contacted yet.
    Created,
    /// A provider call is in flight.
    Authorizing,
    /// The provider has reserved the funds; capture is outstanding.
    Authorized,
    /// The funds have been captured. Terminal.
    Captured,
    /// All eligible providers were exhausted, or the card was declined. Terminal.
    Failed,
    /// A refund call is in flight.
    Refunding,
    /// The captured amount has been returned to the customer. Terminal.
    Refunded,
    /// The intent was cancelled before any capture. Terminal.
    Cancelled,
}

impl IntentStatus {
    /// Terminal intents never transition again; a terminal row is the stored answer to any retried charge.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntentStatus::Captured | IntentStatus::Failed | IntentStatus::Refunded | IntentStatus::Cancelled)
    }
}

impl Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IntentStatus::Created => "Created",
            IntentStatus::Authorizing => "Authorizing",
            IntentStatus::Authorized => "Authorized",
            IntentStatus::Captured => "Captured",
            IntentStatus::Failed => "Failed",
            IntentStatus::Refunding => "Refunding",
            IntentStatus::Refunded => "Refunded",
            IntentStatus::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

impl FromStr for IntentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(Self::Created),
            "Authorizing" => Ok(Self::Authorizing),
            "Authorized" => Ok(Self::Authorized),
            "Captured" => Ok(Self::Captured),
            "Failed" => Ok(Self::Failed),
            "Refunding" => Ok(Self::Refunding),
            "Refunded" => Ok(Self::Refunded),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid intent status: {s}"))),
        }
    }
}

impl From<String> for IntentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid intent status: {value}. But this conversion cannot fail. Defaulting to Created");
            IntentStatus::Created
        })
    }
}

//--------------------------------------       Channel       ---------------------------------------------------------
/// How the card was presented. Providers price in-person and online transactions differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    CardPresent,
    CardNotPresent,
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::CardPresent => write!(f, "card_present"),
            Channel::CardNotPresent => write!(f, "card_not_present"),
        }
    }
}

impl FromStr for Channel {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card_present" => Ok(Self::CardPresent),
            "card_not_present" => Ok(Self::CardNotPresent),
            s => Err(ConversionError(format!("Invalid channel: {s}"))),
        }
    }
}

//--------------------------------------     CardOrigin      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardOrigin {
    Domestic,
    International,
}

impl Display for CardOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardOrigin::Domestic => write!(f, "domestic"),
            CardOrigin::International => write!(f, "international"),
        }
    }
}

impl FromStr for CardOrigin {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "domestic" => Ok(Self::Domestic),
            "international" => Ok(Self::International),
            s => Err(ConversionError(format!("Invalid card origin: {s}"))),
        }
    }
}

//--------------------------------------   PaymentIntent     ---------------------------------------------------------
/// The durable record of one logical charge for an order. Exactly one row exists per intent id; every state
/// transition increments `version` and is applied via compare-and-swap against the caller's expected version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: IntentId,
    pub order_id: String,
    /// The gross amount to charge, in minor currency units.
    pub amount: Money,
    pub currency: String,
    pub channel: Channel,
    pub card_origin: CardOrigin,
    pub status: IntentStatus,
    /// The provider the orchestrator is currently driving (or drove to completion).
    pub chosen_provider: Option<ProviderId>,
    pub provider_attempt_count: i64,
    /// Providers already tried and exhausted for this intent, in the order they were tried.
    pub attempted_providers: Vec<ProviderId>,
    /// The external transaction id, once a provider has issued one.
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency counter. The backbone of exactly-once-effect.
    pub version: i64,
}

//-------------------------------------- NewPaymentIntent    ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub id: IntentId,
    pub order_id: String,
    pub amount: Money,
    pub currency: String,
    pub channel: Channel,
    pub card_origin: CardOrigin,
}

impl NewPaymentIntent {
    pub fn new(id: IntentId, order_id: String, amount: Money, currency: String) -> Self {
        Self { id, order_id, amount, currency, channel: Channel::CardPresent, card_origin: CardOrigin::Domestic }
    }

    /// Two create calls are the same logical charge only if order, amount and currency all agree.
    /// Anything else with a matching id is a client programming error.
    pub fn is_equivalent(&self, intent: &PaymentIntent) -> bool {
        self.id == intent.id
            && self.order_id == intent.order_id
            && self.amount == intent.amount
            && self.currency == intent.currency
    }
}

//-------------------------------------- AttemptOutcome      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    /// The provider accepted the charge.
    Success,
    /// Card-level failure (insufficient funds, stolen card). Customer-fixable, not provider-fixable.
    Declined,
    /// The provider did not answer within the call budget.
    Timeout,
    /// Infrastructure-level failure (5xx, connection refused, malformed response).
    Error,
}

impl Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Success => write!(f, "Success"),
            AttemptOutcome::Declined => write!(f, "Declined"),
            AttemptOutcome::Timeout => write!(f, "Timeout"),
            AttemptOutcome::Error => write!(f, "Error"),
        }
    }
}

impl FromStr for AttemptOutcome {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Success" => Ok(Self::Success),
            "Declined" => Ok(Self::Declined),
            "Timeout" => Ok(Self::Timeout),
            "Error" => Ok(Self::Error),
            s => Err(ConversionError(format!("Invalid attempt outcome: {s}"))),
        }
    }
}

impl From<String> for AttemptOutcome {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid attempt outcome: {value}. But this conversion cannot fail. Defaulting to Error");
            AttemptOutcome::Error
        })
    }
}

//-------------------------------------- ProviderAttempt     ---------------------------------------------------------
/// One call made to one provider on behalf of an intent. Append-only: rows are opened immediately before the
/// adapter call and closed immediately after (or by the stale-attempt sweep). They form the audit trail; the
/// mutable summary lives on [`PaymentIntent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub id: i64,
    pub intent_id: IntentId,
    pub provider: ProviderId,
    /// Merchant reference generated at attempt start and passed to the provider. Webhooks echo it back, so the
    /// reference-to-intent mapping exists even if the synchronous response is lost.
    pub attempt_ref: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<AttemptOutcome>,
    pub provider_reference: Option<String>,
    pub raw_code: Option<String>,
}

//-------------------------------------- FeeBreakdown        ---------------------------------------------------------
/// How a gross amount splits between the provider, the platform and the merchant. Value object; never persisted
/// on its own. `gross = provider_fee + platform_fee + net_to_merchant` holds exactly by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub gross_amount: Money,
    pub provider_fee: Money,
    pub platform_fee: Money,
    pub net_to_merchant: Money,
}

impl FeeBreakdown {
    pub fn new(gross_amount: Money, provider_fee: Money, platform_fee: Money) -> Self {
        let net_to_merchant = gross_amount - provider_fee - platform_fee;
        Self { gross_amount, provider_fee, platform_fee, net_to_merchant }
    }

    pub fn total_fees(&self) -> Money {
        self.provider_fee + self.platform_fee
    }
}

impl Display for FeeBreakdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "gross: {}, provider fee: {}, platform fee: {}, net: {}",
            self.gross_amount, self.provider_fee, self.platform_fee, self.net_to_merchant
        )
    }
}
