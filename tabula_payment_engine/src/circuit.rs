//! Per-provider circuit breaker.
//!
//! Keeps a rolling window of recent attempt outcomes per provider. A provider whose error rate crosses the
//! configured threshold is excluded from selection ordering until a cooldown elapses, so one degraded provider
//! cannot drag every charge through its timeout budget. Thresholds, window size and cooldown are business
//! configuration, not constants.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use log::*;

use crate::db_types::ProviderId;

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// How many recent outcomes to keep per provider.
    pub window: usize,
    /// Never open on fewer samples than this, no matter the rate.
    pub min_samples: usize,
    /// Open when strictly more than this percentage of the window are errors.
    pub error_threshold_pct: u8,
    /// How long an open breaker stays open.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { window: 10, min_samples: 4, error_threshold_pct: 50, cooldown: Duration::from_secs(30) }
    }
}

#[derive(Debug, Default)]
struct ProviderWindow {
    /// true = error
    outcomes: VecDeque<bool>,
    open_until: Option<Instant>,
}

/// Shared, clone-cheap breaker state. Interior mutability behind a plain mutex: every operation is a few
/// integer updates, never held across an await.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    providers: Arc<Mutex<HashMap<ProviderId, ProviderWindow>>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self { config, providers: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn record_success(&self, provider: &ProviderId) {
        let mut providers = self.providers.lock().expect("breaker state poisoned");
        let window = providers.entry(provider.clone()).or_default();
        push_outcome(window, false, self.config.window);
    }

    pub fn record_error(&self, provider: &ProviderId) {
        let mut providers = self.providers.lock().expect("breaker state poisoned");
        let window = providers.entry(provider.clone()).or_default();
        push_outcome(window, true, self.config.window);
        let samples = window.outcomes.len();
        if samples < self.config.min_samples || window.open_until.is_some() {
            return;
        }
        let errors = window.outcomes.iter().filter(|e| **e).count();
        let rate_pct = errors * 100 / samples;
        if rate_pct > usize::from(self.config.error_threshold_pct) {
            let until = Instant::now() + self.config.cooldown;
            window.open_until = Some(until);
            warn!(
                "⚡️ Circuit breaker for {provider} opened: {errors}/{samples} recent attempts failed. Excluded \
                 from selection for {:?}.",
                self.config.cooldown
            );
        }
    }

    /// Whether the provider is currently excluded from selection. An elapsed cooldown closes the breaker and
    /// clears the window, giving the provider a clean probation.
    pub fn is_open(&self, provider: &ProviderId) -> bool {
        let mut providers = self.providers.lock().expect("breaker state poisoned");
        let Some(window) = providers.get_mut(provider) else {
            return false;
        };
        match window.open_until {
            Some(until) if Instant::now() >= until => {
                info!("⚡️ Circuit breaker for {provider} cooled down. Re-admitting.");
                window.open_until = None;
                window.outcomes.clear();
                false
            },
            Some(_) => true,
            None => false,
        }
    }
}

fn push_outcome(window: &mut ProviderWindow, is_error: bool, capacity: usize) {
    if window.outcomes.len() == capacity {
        window.outcomes.pop_front();
    }
    window.outcomes.push_back(is_error);
}
