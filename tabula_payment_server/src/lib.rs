//! # Tabula payment server
//!
//! The HTTP face of the payment orchestration core. Terminals and the order service talk to this server; it
//! never talks back to them, so the surface is small:
//!
//! * `POST /payments/{intent_id}`: charge an order. Safe to retry with the same intent id.
//! * `GET /payments/{intent_id}`: the stored outcome of a charge, without touching any provider.
//! * `POST /payments/{intent_id}/refund`: return a captured payment in full.
//! * `POST /webhooks/{provider}`: signed asynchronous confirmations from the payment providers.
//! * `/health`: a health check route that returns a 200 OK response.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.

pub mod config;
pub mod data_objects;
pub mod errors;
pub mod routes;
pub mod server;
pub mod sweep_worker;

#[cfg(test)]
mod endpoint_tests;
