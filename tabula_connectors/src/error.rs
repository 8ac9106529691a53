use tabula_payment_engine::traits::AdapterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
}

/// Fold a reqwest failure into the engine's adapter error taxonomy. Timeouts stay timeouts; everything else on
/// the wire is a network failure eligible for failover.
pub fn map_reqwest_error(e: reqwest::Error) -> AdapterError {
    if e.is_timeout() {
        AdapterError::Timeout
    } else {
        AdapterError::Network(e.to_string())
    }
}
