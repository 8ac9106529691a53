#![allow(dead_code)]
use std::{sync::Arc, time::Duration};

use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tab_common::Money;
use tabula_payment_engine::{
    api::{AdapterRegistry, ChargeRequest, OrchestratorApi, OrchestratorConfig, ReconcilerApi},
    circuit::{BreakerConfig, CircuitBreaker},
    credentials::{CredentialManager, Sealer, SecretMaterial},
    db_types::{CardOrigin, Channel, IntentId, ProviderId},
    events::EventProducers,
    fees::{FeeSchedule, RateCard},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        scripted::{ScriptedAdapter, ScriptedResponse},
    },
    PaymentLedger,
    ProviderAdapter,
    SqliteLedger,
};

pub const TEST_KEY: [u8; 32] = [42u8; 32];

pub struct Harness {
    pub ledger: SqliteLedger,
    pub orchestrator: OrchestratorApi<SqliteLedger, SqliteLedger>,
    pub reconciler: ReconcilerApi<SqliteLedger, SqliteLedger>,
    pub credentials: CredentialManager<SqliteLedger>,
}

/// Standard rate cards: meridian is the cheapest, then bridgepay, then vantage. Platform margin 100bps.
pub fn fee_schedule() -> FeeSchedule {
    FeeSchedule::new(100)
        .with_flat_rate(ProviderId::from("meridian"), RateCard::new(150, 10))
        .with_flat_rate(ProviderId::from("bridgepay"), RateCard::new(220, 20))
        .with_flat_rate(ProviderId::from("vantage"), RateCard::new(290, 30))
}

pub async fn setup(adapters: Vec<Arc<ScriptedAdapter>>) -> Harness {
    setup_with_config(adapters, OrchestratorConfig::default()).await
}

pub async fn setup_with_config(adapters: Vec<Arc<ScriptedAdapter>>, config: OrchestratorConfig) -> Harness {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let ledger = SqliteLedger::new(url, 5).await.expect("Error creating database");
    let credentials = CredentialManager::new(ledger.clone(), Sealer::new(TEST_KEY));
    let mut registry = AdapterRegistry::new();
    for adapter in adapters {
        let provider = adapter.name().clone();
        let material = SecretMaterial::ApiKey {
            api_key: format!("sk_test_{provider}"),
            webhook_secret: webhook_secret(&provider),
        };
        credentials.store_material(&provider, &material, None).await.expect("Error storing credential");
        registry = registry.register(adapter);
    }
    let orchestrator = OrchestratorApi::new(
        ledger.clone(),
        credentials.clone(),
        registry.clone(),
        fee_schedule(),
        CircuitBreaker::new(BreakerConfig::default()),
        EventProducers::default(),
    )
    .with_config(config);
    let reconciler = ReconcilerApi::new(ledger.clone(), registry, credentials.clone(), EventProducers::default());
    Harness { ledger, orchestrator, reconciler, credentials }
}

pub async fn tear_down(harness: Harness) {
    let url = harness.ledger.url().to_string();
    drop(harness);
    if let Err(e) = Sqlite::drop_database(&url).await {
        error!("🚀️ Failed to drop test database: {e}");
    }
}

pub fn webhook_secret(provider: &ProviderId) -> String {
    format!("whsec_{provider}")
}

pub fn charge_request(intent_id: &str, amount: i64) -> ChargeRequest {
    ChargeRequest {
        intent_id: IntentId::from(intent_id.to_string()),
        order_id: format!("order-{intent_id}"),
        amount: Money::from(amount),
        currency: "USD".to_string(),
        channel: Channel::CardPresent,
        card_origin: CardOrigin::Domestic,
        preferred_providers: None,
    }
}

pub fn success(reference: &str) -> ScriptedResponse {
    ScriptedResponse::Success { reference: reference.to_string() }
}

pub fn declined(code: &str) -> ScriptedResponse {
    ScriptedResponse::Declined { code: code.to_string() }
}

pub fn outage() -> ScriptedResponse {
    ScriptedResponse::NetworkError
}

pub fn hang(millis: u64) -> ScriptedResponse {
    ScriptedResponse::Hang(Duration::from_millis(millis))
}
