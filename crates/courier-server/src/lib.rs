//! # courier-server
//!
//! HTTP and WebSocket surface of the Courier relay, built on axum.
//!
//! - `GET  /v1/subscribe`: WebSocket upgrade, handed to [`courier_relay::RelayHub`]
//! - `PUT  /v1/publish`: deliver to one identity (`Token` header)
//! - `POST /v1/broadcast`: deliver to every identity
//! - `GET  /v1/stats`, `/v1/stats/sessions`, `/v1/health`
//! - `GET  /metrics`: Prometheus text format

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod response;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{AppState, CourierServer};
pub use shutdown::{DrainReport, ShutdownCoordinator};
