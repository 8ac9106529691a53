use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use tabula_payment_engine::{
    api::{AdapterRegistry, OrchestratorConfig},
    circuit::CircuitBreaker,
    credentials::Sealer,
    events::{EventHandlers, EventHooks, EventProducers},
    CredentialManager,
    OrchestratorApi,
    ReconcilerApi,
    SqliteLedger,
};
use tabula_connectors::{
    BridgePayAdapter,
    BridgePayConfig,
    MeridianAdapter,
    MeridianConfig,
    VantageAdapter,
    VantageConfig,
    VantageTokenRefresher,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    routes::{charge, health, payment_status, refund, webhook},
    sweep_worker::start_sweep_worker,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let ledger = SqliteLedger::new(config.database_url.clone(), 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let credentials = build_credential_manager(&config, ledger.clone())?;
    seed_credentials(&credentials, &config).await?;
    let mut hooks = EventHooks::default();
    hooks.on_payment_captured(|ev| {
        Box::pin(async move {
            info!("📬️ Payment captured for order {} ({})", ev.intent.order_id, ev.intent.amount);
        })
    });
    hooks.on_payment_failed(|ev| {
        Box::pin(async move {
            warn!("📬️ Payment failed for order {}", ev.intent.order_id);
        })
    });
    let handlers = EventHandlers::new(25, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    start_sweep_worker(ledger.clone(), config.sweep_interval, config.stale_attempt_timeout);
    let srv = create_server_instance(config, ledger, credentials, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    ledger: SqliteLedger,
    credentials: CredentialManager<SqliteLedger>,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let adapters = build_adapter_registry()?;
    let fees = config.fees.schedule();
    let breaker = CircuitBreaker::new(config.breaker);
    let orchestrator_config = OrchestratorConfig {
        provider_timeout: config.provider_timeout,
        max_provider_attempts: config.max_provider_attempts,
    };
    let srv = HttpServer::new(move || {
        let orchestrator = OrchestratorApi::new(
            ledger.clone(),
            credentials.clone(),
            adapters.clone(),
            fees.clone(),
            breaker.clone(),
            producers.clone(),
        )
        .with_config(orchestrator_config);
        let reconciler =
            ReconcilerApi::new(ledger.clone(), adapters.clone(), credentials.clone(), producers.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("tab::access_log"))
            .app_data(web::Data::new(orchestrator))
            .app_data(web::Data::new(reconciler))
            .service(health)
            .service(charge)
            .service(payment_status)
            .service(refund)
            .service(webhook)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Every adapter this deployment can route charges to. A provider missing from the fee schedule or the
/// credential store is registered here all the same; the orchestrator skips it at selection time.
fn build_adapter_registry() -> Result<AdapterRegistry, ServerError> {
    let meridian = MeridianAdapter::new(MeridianConfig::new_from_env_or_default())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let vantage = VantageAdapter::new(VantageConfig::new_from_env_or_default())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let bridgepay = BridgePayAdapter::new(BridgePayConfig::new_from_env_or_default())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    Ok(AdapterRegistry::new().register(Arc::new(meridian)).register(Arc::new(vantage)).register(Arc::new(bridgepay)))
}

fn build_credential_manager(
    config: &ServerConfig,
    ledger: SqliteLedger,
) -> Result<CredentialManager<SqliteLedger>, ServerError> {
    let sealer = Sealer::from_hex(config.credential_key.reveal())
        .map_err(|e| ServerError::InitializeError(format!("Invalid TAB_CREDENTIAL_KEY: {e}")))?;
    let vantage_config = VantageConfig::new_from_env_or_default();
    let refresher = VantageTokenRefresher::new(&vantage_config)
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    Ok(CredentialManager::new(ledger, sealer)
        .with_refresher("vantage".into(), Arc::new(refresher))
        .with_refresh_timeout(config.credential_refresh_timeout))
}

/// Seal any provider secrets supplied via the environment into the store. Runs on every boot; an unchanged
/// secret is just overwritten with itself.
async fn seed_credentials(
    credentials: &CredentialManager<SqliteLedger>,
    config: &ServerConfig,
) -> Result<(), ServerError> {
    for (provider, material) in &config.credential_seeds {
        credentials
            .store_material(provider, material, None)
            .await
            .map_err(|e| ServerError::InitializeError(format!("Could not store credentials for {provider}: {e}")))?;
        info!("🔑️ Stored credentials for {provider}");
    }
    Ok(())
}
