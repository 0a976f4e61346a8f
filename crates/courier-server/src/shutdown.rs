//! Graceful shutdown: stop accepting, tear down relay connections, wait.

use std::time::Duration;

use courier_relay::RelayHub;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::graceful_shutdown`] waits by default.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// What a graceful shutdown managed to finish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainReport {
    /// The HTTP listener task returned.
    pub listener_stopped: bool,
    /// Relay connections still open when the wait ended.
    pub connections_left: usize,
}

impl DrainReport {
    /// Everything finished within the timeout.
    pub fn is_clean(&self) -> bool {
        self.listener_stopped && self.connections_left == 0
    }
}

/// Owns the token that the listener and every relay connection hang off.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the token. Hubs built with it close their connections
    /// when shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Start shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, then wait up to `timeout` for the listener task to
    /// return and for `hub` to have no open connections.
    pub async fn graceful_shutdown(
        &self,
        hub: &RelayHub,
        listener: JoinHandle<()>,
        timeout: Option<Duration>,
    ) -> DrainReport {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        info!(
            connections = hub.open_connections(),
            timeout_secs = timeout.as_secs(),
            "draining relay connections"
        );

        let listener_stopped = tokio::time::timeout(timeout, async {
            let _ = listener.await;
            hub.wait_idle().await;
        })
        .await
        .is_ok();

        let report = DrainReport {
            listener_stopped,
            connections_left: hub.open_connections(),
        };
        if report.is_clean() {
            info!("shutdown complete");
        } else {
            warn!(
                connections_left = report.connections_left,
                "shutdown timed out after {timeout:?}"
            );
        }
        report
    }
}
