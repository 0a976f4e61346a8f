//! `RelayHub`: the process-wide relay state that adapters talk to.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use courier_core::{Identity, MessageId};
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::Payload;
use crate::cache::OfflineCache;
use crate::config::RelayConfig;
use crate::connection::{self, ConnectionHandle};
use crate::gate::Gate;
use crate::metrics::MESSAGES_PUBLISHED_TOTAL;
use crate::registry::{Fanout, SubscriptionRegistry};
use crate::transport::{FrameSink, FrameStream};

/// Result of [`RelayHub::publish`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The identity had active sessions.
    Delivered {
        /// Sessions the payload was enqueued for.
        recipients: usize,
        /// Sessions skipped because their channel was full.
        dropped: usize,
    },
    /// No active session; the payload was cached.
    Cached {
        /// Id of the cached message.
        message_id: MessageId,
    },
}

/// State shared by the hub and every connection task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: RelayConfig,
    pub(crate) registry: Mutex<SubscriptionRegistry>,
    pub(crate) cache: OfflineCache,
    pub(crate) gate: Gate,
    pub(crate) shutdown: CancellationToken,
    pub(crate) open_connections: AtomicUsize,
    /// Woken when `open_connections` drops to zero.
    pub(crate) idle: Notify,
}

/// Owner of the registry, the cache and the gate. Clones share state.
#[derive(Clone, Debug)]
pub struct RelayHub {
    shared: Arc<Shared>,
}

impl RelayHub {
    /// Create a hub with empty registry and cache.
    pub fn new(config: RelayConfig) -> Self {
        Self::with_shutdown(config, CancellationToken::new())
    }

    /// Create a hub whose connections are torn down when `shutdown` fires.
    pub fn with_shutdown(config: RelayConfig, shutdown: CancellationToken) -> Self {
        let shared = Shared {
            registry: Mutex::new(SubscriptionRegistry::new(
                config.channel_capacity,
                config.delivery_mode,
            )),
            cache: OfflineCache::new(config.cache_ttl),
            gate: Gate::new(config.gate_mode),
            shutdown,
            open_connections: AtomicUsize::new(0),
            idle: Notify::new(),
            config,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Hand an upgraded transport to the relay. Must be called from within
    /// a Tokio runtime.
    pub fn upgrade(
        &self,
        sink: impl FrameSink,
        stream: FrameStream,
        peer: impl Into<String>,
    ) -> ConnectionHandle {
        connection::spawn(Arc::clone(&self.shared), Box::new(sink), stream, peer.into())
    }

    /// Deliver `payload` to every active session of `identity`, or cache it
    /// if there is none.
    ///
    /// The active-session check and the cache insert happen under the
    /// registry lock, the same lock a new subscription holds while taking
    /// the cache, so a message is never cached after its recipient has
    /// already drained the cache.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub async fn publish(&self, identity: &str, payload: Payload) -> PublishOutcome {
        let fanout = {
            let _pass = self.shared.gate.enter().await;
            let registry = self.shared.registry.lock();
            if registry.active_count(identity) == 0 {
                let message_id = self.shared.cache.put(&Identity::from(identity), payload);
                drop(registry);
                counter!(MESSAGES_PUBLISHED_TOTAL, "outcome" => "cached").increment(1);
                debug!(%message_id, "no active session, message cached");
                return PublishOutcome::Cached { message_id };
            }
            registry.publish(identity, payload)
        };

        let report = fanout.finish().await;
        counter!(MESSAGES_PUBLISHED_TOTAL, "outcome" => "delivered").increment(1);
        debug!(recipients = report.delivered, dropped = report.dropped, "message published");
        PublishOutcome::Delivered {
            recipients: report.delivered,
            dropped: report.dropped,
        }
    }

    /// Publish `payload` to every registered identity. Nothing is cached.
    /// Returns the number of identities addressed.
    #[instrument(skip_all, fields(len = payload.len()))]
    pub async fn broadcast_all(&self, payload: Payload) -> usize {
        let fanouts: Vec<Fanout> = {
            let _pass = self.shared.gate.enter().await;
            let registry = self.shared.registry.lock();
            registry
                .identities()
                .iter()
                .map(|identity| registry.publish(identity, payload.clone()))
                .collect()
        };

        let addressed = fanouts.len();
        for fanout in fanouts {
            let _ = fanout.finish().await;
        }
        info!(recipients = addressed, "message broadcast");
        addressed
    }

    /// Active session count per identity.
    pub fn active_session_counts(&self) -> BTreeMap<String, usize> {
        self.shared.registry.lock().session_counts()
    }

    /// Number of identities with at least one active session.
    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Connections currently running, authenticated or not.
    pub fn open_connections(&self) -> usize {
        self.shared.open_connections.load(Ordering::Acquire)
    }

    /// Resolve once no connection is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            let _ = notified.as_mut().enable();
            if self.open_connections() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// The offline cache.
    pub fn cache(&self) -> &OfflineCache {
        &self.shared.cache
    }

    /// Hub configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.shared.config
    }

    /// Tear down every connection.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use courier_settings::DeliveryMode;

    use super::*;
    use crate::connection::ConnectionState;
    use crate::testing::memory_transport;

    fn text(s: &str) -> Payload {
        Arc::from(s)
    }

    async fn connect(hub: &RelayHub, identity: &str) -> (ConnectionHandle, crate::testing::Peer) {
        let (sink, stream, peer) = memory_transport();
        let mut handle = hub.upgrade(sink, stream, "test");
        peer.send_text(&format!("HELLO {identity}"));
        assert_eq!(handle.wait_for(ConnectionState::Active).await, ConnectionState::Active);
        (handle, peer)
    }

    #[tokio::test]
    async fn publish_without_session_caches() {
        let hub = RelayHub::new(RelayConfig::default());
        let outcome = hub.publish("nobody", text("m")).await;
        assert_matches!(outcome, PublishOutcome::Cached { .. });
        assert_eq!(hub.cache().len("nobody"), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_message_expires_before_subscribe() {
        let hub = RelayHub::new(RelayConfig {
            cache_ttl: Duration::from_secs(4),
            ..RelayConfig::default()
        });
        let _ = hub.publish("late", text("m")).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let (_handle, mut peer) = connect(&hub, "late").await;
        let _ = hub.publish("late", text("fresh")).await;
        assert_eq!(peer.next_text().await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn publish_fans_out_to_all_sessions() {
        let hub = RelayHub::new(RelayConfig::default());
        let (_a, mut peer_a) = connect(&hub, "u").await;
        let (_b, mut peer_b) = connect(&hub, "u").await;

        let outcome = hub.publish("u", text("both")).await;
        assert_eq!(outcome, PublishOutcome::Delivered { recipients: 2, dropped: 0 });
        assert_eq!(peer_a.next_text().await.as_deref(), Some("both"));
        assert_eq!(peer_b.next_text().await.as_deref(), Some("both"));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_identity() {
        let hub = RelayHub::new(RelayConfig::default());
        let (_a, mut peer_a) = connect(&hub, "a").await;
        let (_b, mut peer_b) = connect(&hub, "b").await;

        assert_eq!(hub.broadcast_all(text("all")).await, 2);
        assert_eq!(peer_a.next_text().await.as_deref(), Some("all"));
        assert_eq!(peer_b.next_text().await.as_deref(), Some("all"));
    }

    #[tokio::test]
    async fn broadcast_with_no_subscribers_caches_nothing() {
        let hub = RelayHub::new(RelayConfig::default());
        assert_eq!(hub.broadcast_all(text("void")).await, 0);
        assert_eq!(hub.cache().identity_count(), 0);
    }

    #[tokio::test]
    async fn session_counts_reflect_connections() {
        let hub = RelayHub::new(RelayConfig::default());
        let (_a1, _pa1) = connect(&hub, "a").await;
        let (_a2, _pa2) = connect(&hub, "a").await;
        let (_b, _pb) = connect(&hub, "b").await;

        let counts = hub.active_session_counts();
        assert_eq!(counts.get("a"), Some(&2));
        assert_eq!(counts.get("b"), Some(&1));
        assert_eq!(hub.subscriber_count(), 2);
        assert_eq!(hub.open_connections(), 3);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_without_connections() {
        let hub = RelayHub::new(RelayConfig::default());
        tokio::time::timeout(Duration::from_secs(1), hub.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_idle_resolves_after_shutdown_tears_down_connections() {
        let hub = RelayHub::new(RelayConfig::default());
        let (_a, _pa) = connect(&hub, "a").await;
        let (_b, _pb) = connect(&hub, "b").await;
        let (sink, stream, _pc) = memory_transport();
        let _unauthenticated = hub.upgrade(sink, stream, "test");
        assert_eq!(hub.open_connections(), 3);

        let waiter = tokio::spawn({
            let hub = hub.clone();
            async move { hub.wait_idle().await }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        hub.shutdown();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hub.open_connections(), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn drop_mode_reports_drops_for_stalled_session() {
        let hub = RelayHub::new(RelayConfig {
            delivery_mode: DeliveryMode::Drop,
            channel_capacity: 1,
            ..RelayConfig::default()
        });
        let (_handle, peer) = connect(&hub, "slow").await;
        peer.stall_writes();

        let mut dropped = 0;
        for i in 0..5 {
            if let PublishOutcome::Delivered { dropped: d, .. } =
                hub.publish("slow", text(&i.to_string())).await
            {
                dropped += d;
            }
        }
        assert!(dropped > 0);
    }
}
