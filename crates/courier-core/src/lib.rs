//! # courier-core
//!
//! Foundation types shared by every Courier crate.
//!
//! - **Identifiers**: [`Identity`] (client-chosen partition key) and
//!   [`MessageId`] / [`ConnectionId`] (generated, UUID v7)
//! - **Logging**: [`logging::init_subscriber`] for the global `tracing` setup

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;

pub use ids::{ConnectionId, Identity, MessageId};
