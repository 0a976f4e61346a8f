//! `/v1/health` response.

use serde::Serialize;
use std::time::Instant;

/// Health check response body. Keeps the `message`/`data` envelope and
/// adds live counters next to it.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Request path.
    pub message: String,
    /// Always `"OK"` when the server is running.
    pub data: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections, authenticated or not.
    pub connections: usize,
    /// Identities with at least one active session.
    pub subscribers: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    message: String,
    start_time: Instant,
    connections: usize,
    subscribers: usize,
) -> HealthResponse {
    HealthResponse {
        message,
        data: "OK",
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        subscribers,
    }
}
