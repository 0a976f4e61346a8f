//! Settings types. Every struct is `#[serde(default)]`, so a settings file
//! only needs the keys it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Transport deadlines and buffer sizes.
    pub transport: TransportSettings,
    /// Offline cache settings.
    pub cache: CacheSettings,
    /// Per-session delivery channel settings.
    pub delivery: DeliverySettings,
    /// Serialization gate settings.
    pub gate: GateSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Check values that deserialize fine but cannot be run with.
    pub fn validate(&self) -> crate::errors::Result<()> {
        let timeout = self.transport.timeout_secs;
        if !(1..=TransportSettings::MAX_TIMEOUT_SECS).contains(&timeout) {
            return Err(SettingsError::InvalidValue(format!(
                "transport.timeoutSecs must be between 1 and {}, got {timeout}",
                TransportSettings::MAX_TIMEOUT_SECS
            )));
        }
        if self.server.max_body_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxBodyBytes must be at least 1".into(),
            ));
        }
        if self.delivery.channel_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "delivery.channelCapacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Address the HTTP listener binds to.
    pub listen: String,
    /// Largest publish or broadcast body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3498".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// WebSocket read buffer size in bytes.
    pub read_buffer_size: usize,
    /// WebSocket write buffer size in bytes.
    pub write_buffer_size: usize,
    /// Read/write deadline and keepalive liveness threshold, in seconds.
    pub timeout_secs: u64,
}

impl TransportSettings {
    /// Largest accepted `timeout_secs` (one day).
    pub const MAX_TIMEOUT_SECS: u64 = 86_400;

    /// The timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            read_buffer_size: 51_200,
            write_buffer_size: 102_400,
            timeout_secs: 60,
        }
    }
}

/// Offline cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Time-to-live for a cached message, in milliseconds.
    pub ttl_ms: u64,
}

impl CacheSettings {
    /// The TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl_ms: 5_000 }
    }
}

/// How a publish behaves when a session's delivery channel is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Wait until the session drains its channel.
    #[default]
    Blocking,
    /// Skip the session and count the drop.
    Drop,
}

impl std::str::FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocking" => Ok(Self::Blocking),
            "drop" => Ok(Self::Drop),
            other => Err(format!("unknown delivery mode: {other}")),
        }
    }
}

/// Per-session delivery channel settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySettings {
    /// Behaviour when a session's channel is full.
    pub mode: DeliveryMode,
    /// Bounded capacity of each session's delivery channel.
    pub channel_capacity: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Blocking,
            channel_capacity: 64,
        }
    }
}

/// Scope of the serialization gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// One process-wide permit covers registry mutation, fan-out and every
    /// transport write.
    Global,
    /// The registry has its own lock and each connection its own write lock.
    #[default]
    Scoped,
}

impl std::str::FromStr for GateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "scoped" => Ok(Self::Scoped),
            other => Err(format!("unknown gate mode: {other}")),
        }
    }
}

/// Serialization gate settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateSettings {
    /// Gate scope.
    pub mode: GateMode,
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Verbosity name (`ERROR`, `INFO`, `DEBUG`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "ERROR".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli_defaults() {
        let s = RelaySettings::default();
        assert_eq!(s.server.listen, "0.0.0.0:3498");
        assert_eq!(s.transport.read_buffer_size, 51_200);
        assert_eq!(s.transport.write_buffer_size, 102_400);
        assert_eq!(s.transport.timeout(), Duration::from_secs(60));
        assert_eq!(s.cache.ttl(), Duration::from_secs(5));
        assert_eq!(s.logging.level, "ERROR");
        assert_eq!(s.server.max_body_bytes, 2_097_152);
    }

    #[test]
    fn default_delivery_is_blocking() {
        let s = DeliverySettings::default();
        assert_eq!(s.mode, DeliveryMode::Blocking);
        assert_eq!(s.channel_capacity, 64);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(RelaySettings::default().validate().is_ok());
    }

    #[test]
    fn timeout_out_of_range_is_invalid() {
        let mut s = RelaySettings::default();
        s.transport.timeout_secs = 0;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));

        s.transport.timeout_secs = TransportSettings::MAX_TIMEOUT_SECS + 1;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));

        s.transport.timeout_secs = TransportSettings::MAX_TIMEOUT_SECS;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn zero_channel_capacity_is_invalid() {
        let mut s = RelaySettings::default();
        s.delivery.channel_capacity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn default_gate_is_scoped() {
        assert_eq!(GateSettings::default().mode, GateMode::Scoped);
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(RelaySettings::default()).unwrap();
        assert!(json["transport"]["readBufferSize"].is_number());
        assert!(json["cache"]["ttlMs"].is_number());
        assert_eq!(json["delivery"]["mode"], "blocking");
        assert_eq!(json["gate"]["mode"], "scoped");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: RelaySettings =
            serde_json::from_str(r#"{"cache": {"ttlMs": 250}}"#).unwrap();
        assert_eq!(s.cache.ttl_ms, 250);
        assert_eq!(s.transport.timeout_secs, 60);
    }

    #[test]
    fn modes_parse_from_str() {
        assert_eq!("drop".parse::<DeliveryMode>().unwrap(), DeliveryMode::Drop);
        assert_eq!("GLOBAL".parse::<GateMode>().unwrap(), GateMode::Global);
        assert!("sometimes".parse::<DeliveryMode>().is_err());
        assert!("local".parse::<GateMode>().is_err());
    }
}
