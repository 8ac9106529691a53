//! Provider adapters for the Tabula payment engine.
//!
//! Each adapter speaks one external payment network's REST dialect and presents it to the engine through the
//! [`tabula_payment_engine::traits::ProviderAdapter`] interface:
//!
//! * **Meridian** — API-key authentication, single-step (auto-capture) charges.
//! * **Vantage** — OAuth2 client-credential tokens with refresh, two-step authorize/capture.
//! * **BridgePay** — API-key authentication, single-step charges. Typically configured as the fallback.
//!
//! All three sign webhooks with HMAC-SHA256 over the raw body, base64-encoded, under a per-provider webhook
//! secret. Verification happens in the engine's reconciler before a payload is parsed.
mod bridgepay;
mod config;
mod error;
mod helpers;
mod meridian;
mod vantage;

pub use bridgepay::BridgePayAdapter;
pub use config::{BridgePayConfig, MeridianConfig, VantageConfig};
pub use error::ConnectorError;
pub use helpers::{calculate_hmac, verify_hmac};
pub use meridian::MeridianAdapter;
pub use vantage::{VantageAdapter, VantageTokenRefresher};
