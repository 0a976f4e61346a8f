//! `CourierServer`: axum HTTP + WebSocket server around a [`RelayHub`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post, put};
use courier_relay::{RelayConfig, RelayHub};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::routes;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The relay.
    pub hub: RelayHub,
    /// Listener and buffer configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The Courier server.
pub struct CourierServer {
    config: Arc<ServerConfig>,
    hub: RelayHub,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl CourierServer {
    /// Create a server. Connections are torn down when the server's
    /// shutdown coordinator fires.
    pub fn new(config: ServerConfig, relay: RelayConfig) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let hub = RelayHub::with_shutdown(relay, shutdown.token());
        Self {
            config: Arc::new(config),
            hub,
            shutdown,
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            config: Arc::clone(&self.config),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/v1/subscribe", get(routes::subscribe))
            .route("/v1/publish", put(routes::publish))
            .route("/v1/broadcast", post(routes::broadcast))
            .route("/v1/stats", get(routes::stats))
            .route("/v1/stats/sessions", get(routes::stats_sessions))
            .route("/v1/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address and the serving task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let listener = tokio::net::TcpListener::bind(&self.config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.listen.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        info!(%local_addr, "courier server started");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(%error, "server error");
            }
            info!("courier server stopped");
        });

        Ok((local_addr, handle))
    }

    /// The relay hub.
    pub fn hub(&self) -> &RelayHub {
        &self.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
