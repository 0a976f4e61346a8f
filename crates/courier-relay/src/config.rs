//! Relay core configuration.

use std::time::Duration;

use courier_settings::{DeliveryMode, GateMode, RelaySettings};

/// Settings the relay core consumes.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Read/write deadline and keepalive liveness threshold.
    pub timeout: Duration,
    /// Offline cache TTL.
    pub cache_ttl: Duration,
    /// Behaviour when a session channel is full.
    pub delivery_mode: DeliveryMode,
    /// Per-session delivery channel capacity.
    pub channel_capacity: usize,
    /// Serialization gate scope.
    pub gate_mode: GateMode,
}

impl RelayConfig {
    /// Extract the core's view of the full settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            timeout: settings.transport.timeout(),
            cache_ttl: settings.cache.ttl(),
            delivery_mode: settings.delivery.mode,
            channel_capacity: settings.delivery.channel_capacity,
            gate_mode: settings.gate.mode,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_settings(&RelaySettings::default())
    }
}
