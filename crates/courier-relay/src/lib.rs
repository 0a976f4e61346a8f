//! # courier-relay
//!
//! The relay core: everything between an upgraded socket and a publish call.
//!
//! - [`cache::OfflineCache`]: per-identity TTL store for messages nobody is
//!   listening for yet
//! - [`registry::SubscriptionRegistry`]: identity to session slots, with
//!   stable per-identity indices
//! - [`handshake`]: `HELLO <identity>` greeting
//! - [`keepalive`]: ping cadence and pong liveness
//! - [`connection`]: one connection's state machine, from upgrade to teardown
//! - [`hub::RelayHub`]: process-wide owner of the above, used by adapters
//!
//! Transports plug in through [`transport::FrameSink`] and
//! [`transport::FrameStream`], so the core never depends on a WebSocket
//! library.

#![deny(unsafe_code)]

pub mod cache;
pub mod config;
pub mod connection;
pub mod gate;
pub mod handshake;
pub mod hub;
pub mod keepalive;
pub mod metrics;
pub mod registry;
pub mod transport;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

/// Message body as relayed to clients. Cheap to clone across fan-out.
pub type Payload = Arc<str>;

pub use cache::{CachedMessage, OfflineCache};
pub use config::RelayConfig;
pub use connection::{ConnectionHandle, ConnectionState};
pub use gate::Gate;
pub use hub::{PublishOutcome, RelayHub};
pub use registry::{DisconnectAction, PublishReport, SubscriptionRegistry};
pub use transport::{Deadlines, Frame, FrameSink, FrameStream, TransportError};
pub use writer::GatedWriter;
