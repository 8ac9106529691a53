use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use tab_common::Secret;
use tabula_payment_engine::{
    circuit::BreakerConfig,
    credentials::SecretMaterial,
    db_types::ProviderId,
    fees::{FeeSchedule, RateCard},
};

const DEFAULT_TAB_HOST: &str = "127.0.0.1";
const DEFAULT_TAB_PORT: u16 = 8480;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_PROVIDER_ATTEMPTS: i64 = 3;
/// An attempt this old with no recorded outcome belongs to a worker that died mid-call.
const DEFAULT_STALE_ATTEMPT_TIMEOUT_SECS: i64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_CREDENTIAL_REFRESH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PLATFORM_FEE_BPS: i64 = 100;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The process-wide credential sealing key, as 64 hex characters.
    pub credential_key: Secret<String>,
    /// Hard ceiling on one synchronous provider call.
    pub provider_timeout: Duration,
    /// How many distinct providers may be tried for one intent before it fails terminally.
    pub max_provider_attempts: i64,
    /// Age at which an in-flight provider attempt is presumed dead and closed by the sweep worker.
    pub stale_attempt_timeout: chrono::Duration,
    /// How often the sweep worker runs.
    pub sweep_interval: Duration,
    /// How long callers wait on a concurrent OAuth2 refresh before failing fast.
    pub credential_refresh_timeout: Duration,
    pub fees: FeeConfig,
    pub breaker: BreakerConfig,
    /// Provider secrets supplied via the environment, sealed into the credential store at startup.
    pub credential_seeds: Vec<(ProviderId, SecretMaterial)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_TAB_HOST.to_string(),
            port: DEFAULT_TAB_PORT,
            database_url: String::default(),
            credential_key: Secret::new(String::default()),
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            max_provider_attempts: DEFAULT_MAX_PROVIDER_ATTEMPTS,
            stale_attempt_timeout: chrono::Duration::seconds(DEFAULT_STALE_ATTEMPT_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            credential_refresh_timeout: Duration::from_secs(DEFAULT_CREDENTIAL_REFRESH_TIMEOUT_SECS),
            fees: FeeConfig::default(),
            breaker: BreakerConfig::default(),
            credential_seeds: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("TAB_HOST").ok().unwrap_or_else(|| DEFAULT_TAB_HOST.into());
        let port = env_or("TAB_PORT", DEFAULT_TAB_PORT);
        let database_url = env::var("TAB_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ TAB_DATABASE_URL is not set. Please set it to the URL for the payment ledger database.");
            String::default()
        });
        let credential_key = env::var("TAB_CREDENTIAL_KEY").ok().unwrap_or_else(|| {
            error!(
                "🪛️ TAB_CREDENTIAL_KEY is not set. Please set it to a 64-character hex string. Provider \
                 credentials cannot be sealed or opened without it."
            );
            String::default()
        });
        let provider_timeout = Duration::from_secs(env_or("TAB_PROVIDER_TIMEOUT_SECS", DEFAULT_PROVIDER_TIMEOUT_SECS));
        let max_provider_attempts = env_or("TAB_MAX_PROVIDER_ATTEMPTS", DEFAULT_MAX_PROVIDER_ATTEMPTS);
        let stale_attempt_timeout =
            chrono::Duration::seconds(env_or("TAB_STALE_ATTEMPT_TIMEOUT_SECS", DEFAULT_STALE_ATTEMPT_TIMEOUT_SECS));
        let sweep_interval = Duration::from_secs(env_or("TAB_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS));
        let credential_refresh_timeout = Duration::from_secs(env_or(
            "TAB_CREDENTIAL_REFRESH_TIMEOUT",
            DEFAULT_CREDENTIAL_REFRESH_TIMEOUT_SECS,
        ));
        Self {
            host,
            port,
            database_url,
            credential_key: Secret::new(credential_key),
            provider_timeout,
            max_provider_attempts,
            stale_attempt_timeout,
            sweep_interval,
            credential_refresh_timeout,
            fees: FeeConfig::from_env_or_default(),
            breaker: breaker_from_env(),
            credential_seeds: credential_seeds_from_env(),
        }
    }
}

//--------------------------------------     FeeConfig       ---------------------------------------------------------
/// The deployment's rate cards. Defaults reflect the launch contracts; override per provider with
/// `TAB_<PROVIDER>_FEE_BPS` and `TAB_<PROVIDER>_FEE_FIXED` (fixed part in minor currency units).
#[derive(Clone, Debug)]
pub struct FeeConfig {
    pub platform_bps: i64,
    pub rate_cards: Vec<(ProviderId, RateCard)>,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            platform_bps: DEFAULT_PLATFORM_FEE_BPS,
            rate_cards: vec![
                (ProviderId::from("meridian"), RateCard::new(150, 10)),
                (ProviderId::from("bridgepay"), RateCard::new(220, 20)),
                (ProviderId::from("vantage"), RateCard::new(290, 30)),
            ],
        }
    }
}

impl FeeConfig {
    pub fn from_env_or_default() -> Self {
        let platform_bps = env_or("TAB_PLATFORM_FEE_BPS", DEFAULT_PLATFORM_FEE_BPS);
        let rate_cards = FeeConfig::default()
            .rate_cards
            .into_iter()
            .map(|(provider, default_card)| {
                let prefix = format!("TAB_{}_FEE", provider.as_str().to_uppercase());
                let bps = env_or(&format!("{prefix}_BPS"), default_card.bps);
                let fixed = env_or(&format!("{prefix}_FIXED"), default_card.fixed.value());
                (provider, RateCard::new(bps, fixed))
            })
            .collect();
        Self { platform_bps, rate_cards }
    }

    pub fn schedule(&self) -> FeeSchedule {
        self.rate_cards
            .iter()
            .fold(FeeSchedule::new(self.platform_bps), |s, (p, card)| s.with_flat_rate(p.clone(), *card))
    }
}

fn breaker_from_env() -> BreakerConfig {
    let defaults = BreakerConfig::default();
    BreakerConfig {
        window: env_or("TAB_BREAKER_WINDOW", defaults.window),
        min_samples: env_or("TAB_BREAKER_MIN_SAMPLES", defaults.min_samples),
        error_threshold_pct: env_or("TAB_BREAKER_ERROR_THRESHOLD_PCT", defaults.error_threshold_pct),
        cooldown: Duration::from_secs(env_or("TAB_BREAKER_COOLDOWN_SECS", defaults.cooldown.as_secs())),
    }
}

/// Collect provider secrets from the environment. A provider with no secrets configured is simply skipped;
/// its credentials can also be provisioned directly in the store out of band.
fn credential_seeds_from_env() -> Vec<(ProviderId, SecretMaterial)> {
    let mut seeds = Vec::new();
    for provider in ["meridian", "bridgepay"] {
        let prefix = format!("TAB_{}", provider.to_uppercase());
        if let (Ok(api_key), Ok(webhook_secret)) =
            (env::var(format!("{prefix}_API_KEY")), env::var(format!("{prefix}_WEBHOOK_SECRET")))
        {
            seeds.push((ProviderId::from(provider), SecretMaterial::ApiKey { api_key, webhook_secret }));
        } else {
            warn!("🪛️ No API key configured for {provider}. It will not be able to take payments until one is stored.");
        }
    }
    let vantage = (
        env::var("TAB_VANTAGE_CLIENT_ID"),
        env::var("TAB_VANTAGE_CLIENT_SECRET"),
        env::var("TAB_VANTAGE_REFRESH_TOKEN"),
        env::var("TAB_VANTAGE_WEBHOOK_SECRET"),
    );
    if let (Ok(client_id), Ok(client_secret), Ok(refresh_token), Ok(webhook_secret)) = vantage {
        // No access token yet; the first charge triggers a refresh through the token endpoint.
        seeds.push((ProviderId::from("vantage"), SecretMaterial::OAuth2 {
            client_id,
            client_secret,
            access_token: String::default(),
            refresh_token,
            webhook_secret,
        }));
    } else {
        warn!("🪛️ No OAuth2 client configured for vantage. It will not be able to take payments until one is stored.");
    }
    seeds
}

fn env_or<T>(var: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
