use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use log::*;
use tabula_payment_engine::{
    api::OrchestratorApi,
    circuit::{BreakerConfig, CircuitBreaker},
    db_types::IntentStatus,
    events::{EventHandlers, EventHooks},
    test_utils::scripted::ScriptedAdapter,
};

mod support;
use support::*;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

#[tokio::test]
async fn captured_and_failed_hooks_fire_once_each() {
    let captured = HookCalled::default();
    let failed = HookCalled::default();
    let captured_copy = captured.clone();
    let failed_copy = failed.clone();
    let mut hooks = EventHooks::default();
    hooks.on_payment_captured(move |ev| {
        info!("🪝️ captured: {:?}", ev.intent.id);
        let hook = captured_copy.clone();
        Box::pin(async move {
            hook.called();
        })
    });
    hooks.on_payment_failed(move |ev| {
        info!("🪝️ failed: {:?}", ev.intent.id);
        let hook = failed_copy.clone();
        Box::pin(async move {
            hook.called();
        })
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();

    let meridian = Arc::new(ScriptedAdapter::new(
        "meridian",
        vec![success("mer-100"), declined("do_not_honour")],
    ));
    let harness = setup(vec![meridian.clone()]).await;
    // Rebuild the orchestrator with live producers attached.
    let orchestrator = OrchestratorApi::new(
        harness.ledger.clone(),
        harness.credentials.clone(),
        tabula_payment_engine::api::AdapterRegistry::new().register(meridian.clone()),
        fee_schedule(),
        CircuitBreaker::new(BreakerConfig::default()),
        producers,
    );
    let first = orchestrator.charge(charge_request("hook-1", 1000)).await.expect("charge failed");
    assert_eq!(first.status, IntentStatus::Captured);
    let second = orchestrator.charge(charge_request("hook-2", 1000)).await.expect("charge failed");
    assert_eq!(second.status, IntentStatus::Failed);
    // A replay reaches a terminal intent and must not re-fire the hook.
    let replay = orchestrator.charge(charge_request("hook-1", 1000)).await.expect("replay failed");
    assert_eq!(replay.status, IntentStatus::Captured);
    // Dropping the orchestrator drops the producers, which lets the handler loops drain and exit.
    drop(orchestrator);
    handlers.start_handlers().await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(captured.count(), 1);
    assert_eq!(failed.count(), 1);
    tear_down(harness).await;
}
