//! Endpoint test scaffolding: a real sqlite ledger in a throwaway file, scripted provider adapters, and the
//! full route table mounted in an in-process actix app.
use std::{sync::Arc, time::Duration};

use serde_json::json;
use tabula_payment_engine::{
    api::{AdapterRegistry, OrchestratorConfig},
    circuit::{BreakerConfig, CircuitBreaker},
    credentials::{Sealer, SecretMaterial},
    db_types::ProviderId,
    events::EventProducers,
    fees::{FeeSchedule, RateCard},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        scripted::{ScriptedAdapter, ScriptedResponse},
    },
    CredentialManager,
    OrchestratorApi,
    ProviderAdapter,
    ReconcilerApi,
    SqliteLedger,
};

use crate::routes::{Orchestrator, Reconciler};

const TEST_SEALER_KEY: [u8; 32] = [42u8; 32];

pub struct TestHarness {
    pub orchestrator: Orchestrator,
    pub reconciler: Reconciler,
    pub adapters: Vec<Arc<ScriptedAdapter>>,
}

/// Rate cards mirror production's ordering: the first adapter registered is the cheapest.
pub async fn setup(adapters: Vec<ScriptedAdapter>) -> TestHarness {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let ledger = SqliteLedger::new(url, 2).await.expect("Could not open the test ledger");
    let credentials = CredentialManager::new(ledger.clone(), Sealer::new(TEST_SEALER_KEY));
    let adapters = adapters.into_iter().map(Arc::new).collect::<Vec<_>>();
    let mut registry = AdapterRegistry::new();
    let mut fees = FeeSchedule::new(100);
    for (i, adapter) in adapters.iter().enumerate() {
        let name = adapter.name().clone();
        let material = SecretMaterial::ApiKey {
            api_key: format!("sk_test_{name}"),
            webhook_secret: webhook_secret(&name),
        };
        credentials.store_material(&name, &material, None).await.expect("Could not store test credentials");
        registry = registry.register(adapter.clone());
        fees = fees.with_flat_rate(name, RateCard::new(150 + 50 * i as i64, 10));
    }
    let breaker = CircuitBreaker::new(BreakerConfig::default());
    let producers = EventProducers::default();
    let config = OrchestratorConfig { provider_timeout: Duration::from_millis(200), max_provider_attempts: 3 };
    let orchestrator = OrchestratorApi::new(
        ledger.clone(),
        credentials.clone(),
        registry.clone(),
        fees,
        breaker,
        producers.clone(),
    )
    .with_config(config);
    let reconciler = ReconcilerApi::new(ledger, registry, credentials, producers);
    TestHarness { orchestrator, reconciler, adapters }
}

pub fn webhook_secret(provider: &ProviderId) -> String {
    format!("whsec_{provider}")
}

pub fn success(name: &str, reference: &str) -> ScriptedAdapter {
    ScriptedAdapter::new(name, vec![ScriptedResponse::Success { reference: reference.to_string() }])
}

pub fn declined(name: &str, code: &str) -> ScriptedAdapter {
    ScriptedAdapter::new(name, vec![ScriptedResponse::Declined { code: code.to_string() }])
}

pub fn outage(name: &str) -> ScriptedAdapter {
    ScriptedAdapter::new(name, vec![ScriptedResponse::NetworkError])
}

pub fn charge_body(order_id: &str, amount: i64) -> serde_json::Value {
    json!({
        "order_id": order_id,
        "amount": amount,
        "currency": "USD",
        "channel": "card_present",
        "card_origin": "domestic",
    })
}

/// Mounts the full route table over the given APIs and returns an initialised test service.
macro_rules! test_app {
    ($orchestrator:expr, $reconciler:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($orchestrator))
                .app_data(actix_web::web::Data::new($reconciler))
                .service(crate::routes::health)
                .service(crate::routes::charge)
                .service(crate::routes::payment_status)
                .service(crate::routes::refund)
                .service(crate::routes::webhook),
        )
        .await
    };
}
pub(crate) use test_app;
