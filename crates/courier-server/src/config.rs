//! Server configuration.

use courier_settings::RelaySettings;

/// Listener and WebSocket buffer configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind, `host:port`. Port `0` auto-assigns.
    pub listen: String,
    /// WebSocket read buffer size in bytes.
    pub read_buffer_size: usize,
    /// WebSocket write buffer size in bytes.
    pub write_buffer_size: usize,
    /// Largest publish or broadcast body accepted, in bytes.
    pub max_body_size: usize,
}

impl ServerConfig {
    /// Extract the server's view of the full settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            listen: settings.server.listen.clone(),
            read_buffer_size: settings.transport.read_buffer_size,
            write_buffer_size: settings.transport.write_buffer_size,
            max_body_size: settings.server.max_body_bytes,
        }
    }

    /// Loopback listener on an auto-assigned port.
    pub fn ephemeral() -> Self {
        Self {
            listen: "127.0.0.1:0".into(),
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&RelaySettings::default())
    }
}
