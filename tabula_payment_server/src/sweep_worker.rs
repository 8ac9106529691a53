use log::*;
use tabula_payment_engine::{db_types::ProviderAttempt, traits::PaymentLedger, SqliteLedger};
use tokio::task::JoinHandle;

/// Starts the stale attempt sweep worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// An attempt with no recorded outcome after `stale_after` belongs to a worker that died between calling the
/// provider and writing the result. The sweep closes it as a timeout; the next charge retry (or the provider's
/// webhook) moves the intent on from there.
pub fn start_sweep_worker(
    ledger: SqliteLedger,
    interval: std::time::Duration,
    stale_after: chrono::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Stale attempt sweep worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running stale attempt sweep");
            match ledger.sweep_stale_attempts(stale_after).await {
                Ok(swept) if swept.is_empty() => {},
                Ok(swept) => {
                    warn!("🕰️ Closed {} stale provider attempts: {}", swept.len(), attempt_list(&swept));
                },
                Err(e) => {
                    error!("🕰️ Error running stale attempt sweep: {e}");
                },
            }
        }
    })
}

fn attempt_list(attempts: &[ProviderAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("[{}] {} via {}", a.id, a.attempt_ref, a.provider))
        .collect::<Vec<String>>()
        .join(", ")
}
