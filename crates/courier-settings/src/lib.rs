//! # courier-settings
//!
//! Configuration for the Courier relay.
//!
//! Loading order (later wins):
//! 1. Compiled [`RelaySettings::default()`]
//! 2. Optional JSON settings file, deep-merged over the defaults
//! 3. `COURIER_*` environment variables
//!
//! CLI flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod duration;
pub mod errors;
pub mod loader;
pub mod types;

pub use duration::parse_duration;
pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path};
pub use types::{
    CacheSettings, DeliveryMode, DeliverySettings, GateMode, GateSettings, LoggingSettings,
    RelaySettings, ServerSettings, TransportSettings,
};
