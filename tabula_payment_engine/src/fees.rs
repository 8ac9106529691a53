//! Provider fee calculation.
//!
//! Pure functions over integer minor-currency-units. No I/O, no floating point. Every provider publishes a rate
//! card (basis points plus a fixed per-transaction fee) that differs by channel (card-present vs online) and by
//! card origin (domestic vs international); the platform adds its own basis-point margin on top. The rate tables
//! are business configuration and are supplied by the caller, not hard-coded here.
use std::collections::HashMap;

use tab_common::Money;

use crate::db_types::{CardOrigin, Channel, FeeBreakdown, ProviderId};

/// Round-half-up application of a basis-point rate to a non-negative minor-unit amount.
///
/// `round_half_up(amount * bps / 10_000)` without ever leaving integer arithmetic: adding half the divisor
/// before the division rounds .5 cases up, which is the rule at the minor-unit boundary for every provider
/// we settle with. Callers guarantee `amount >= 0`.
pub fn apply_bps_half_up(amount: i64, bps: i64) -> i64 {
    debug_assert!(amount >= 0 && bps >= 0);
    (amount * bps + 5_000) / 10_000
}

//--------------------------------------      RateCard       ---------------------------------------------------------
/// One provider's pricing for one (channel, origin) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCard {
    /// Percentage fee in basis points (175 = 1.75%).
    pub bps: i64,
    /// Fixed fee in minor units added to every transaction.
    pub fixed: Money,
}

impl RateCard {
    pub fn new(bps: i64, fixed: i64) -> Self {
        Self { bps, fixed: Money::from(fixed) }
    }

    pub fn fee_for(&self, amount: Money) -> Money {
        Money::from(apply_bps_half_up(amount.value(), self.bps)) + self.fixed
    }
}

//--------------------------------------    FeeSchedule      ---------------------------------------------------------
/// The complete fee configuration: a rate card per (provider, channel, origin) plus the platform margin.
#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    rates: HashMap<(ProviderId, Channel, CardOrigin), RateCard>,
    platform_bps: i64,
}

impl FeeSchedule {
    pub fn new(platform_bps: i64) -> Self {
        Self { rates: HashMap::new(), platform_bps }
    }

    pub fn with_rate(mut self, provider: ProviderId, channel: Channel, origin: CardOrigin, card: RateCard) -> Self {
        self.rates.insert((provider, channel, origin), card);
        self
    }

    /// Convenience for the common case where a provider prices all four (channel, origin) cells the same.
    pub fn with_flat_rate(mut self, provider: ProviderId, card: RateCard) -> Self {
        for channel in [Channel::CardPresent, Channel::CardNotPresent] {
            for origin in [CardOrigin::Domestic, CardOrigin::International] {
                self.rates.insert((provider.clone(), channel, origin), card);
            }
        }
        self
    }

    pub fn platform_bps(&self) -> i64 {
        self.platform_bps
    }

    /// Providers with at least one configured rate card. Order is unspecified; use [`Self::rank_by_cost`] for
    /// selection ordering.
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut result: Vec<ProviderId> = Vec::new();
        for (provider, _, _) in self.rates.keys() {
            if !result.contains(provider) {
                result.push(provider.clone());
            }
        }
        result
    }

    /// Compute the exact fee breakdown for charging `amount` through `provider`. Returns `None` when the
    /// provider has no rate card for the requested channel/origin (a configuration gap, not an error here;
    /// the orchestrator treats such providers as ineligible).
    pub fn quote(
        &self,
        provider: &ProviderId,
        amount: Money,
        channel: Channel,
        origin: CardOrigin,
    ) -> Option<FeeBreakdown> {
        let card = self.rates.get(&(provider.clone(), channel, origin))?;
        let provider_fee = card.fee_for(amount);
        let platform_fee = Money::from(apply_bps_half_up(amount.value(), self.platform_bps));
        Some(FeeBreakdown::new(amount, provider_fee, platform_fee))
    }

    /// Default provider selection order: cheapest total fee first for the given amount. Providers without a
    /// rate card for the channel/origin are excluded entirely. Ties break on provider name so the ordering is
    /// deterministic.
    pub fn rank_by_cost(&self, amount: Money, channel: Channel, origin: CardOrigin) -> Vec<ProviderId> {
        let mut priced: Vec<(Money, ProviderId)> = self
            .providers()
            .into_iter()
            .filter_map(|p| self.quote(&p, amount, channel, origin).map(|fb| (fb.provider_fee, p)))
            .collect();
        priced.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));
        priced.into_iter().map(|(_, p)| p).collect()
    }
}
