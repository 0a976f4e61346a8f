//! Metric names recorded by the relay core.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Publish calls total (counter, labels: outcome).
pub const MESSAGES_PUBLISHED_TOTAL: &str = "relay_messages_published_total";
/// Messages stored in the offline cache (counter).
pub const MESSAGES_CACHED_TOTAL: &str = "relay_messages_cached_total";
/// Cached messages removed by TTL expiry (counter).
pub const MESSAGES_EVICTED_TOTAL: &str = "relay_messages_evicted_total";
/// Deliveries skipped because a session channel was full (counter).
pub const DELIVERY_DROPS_TOTAL: &str = "relay_delivery_drops_total";
/// Keepalive liveness failures (counter).
pub const KEEPALIVE_TIMEOUTS_TOTAL: &str = "relay_keepalive_timeouts_total";
