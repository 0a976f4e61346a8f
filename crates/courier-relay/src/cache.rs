//! Offline message cache.
//!
//! Messages published for an identity with no active session are kept here
//! for a fixed TTL. Each message gets its own eviction timer, so messages
//! for the same identity expire independently. An identity's entry exists
//! only while it holds at least one message.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_core::{Identity, MessageId};
use metrics::counter;
use parking_lot::Mutex;
use tracing::debug;

use crate::Payload;
use crate::metrics::{MESSAGES_CACHED_TOTAL, MESSAGES_EVICTED_TOTAL};

/// A message waiting for its recipient.
#[derive(Clone, Debug)]
pub struct CachedMessage {
    /// Unique within the identity's entry.
    pub id: MessageId,
    /// Message body.
    pub payload: Payload,
    /// Wall-clock insertion time.
    pub inserted_at: DateTime<Utc>,
    /// Process-wide insertion sequence, used for ordering.
    pub seq: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<Identity, HashMap<MessageId, CachedMessage>>,
    next_seq: u64,
}

#[derive(Debug)]
struct CacheInner {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl CacheInner {
    fn evict(&self, identity: &Identity, id: &MessageId) {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(identity) else {
            debug!(%identity, "cache entry already gone, nothing to evict");
            return;
        };
        if entry.remove(id).is_none() {
            return;
        }
        counter!(MESSAGES_EVICTED_TOTAL).increment(1);
        if entry.is_empty() {
            let _ = state.entries.remove(identity);
            debug!(%identity, "cache entry purged");
        } else {
            debug!(%identity, message_id = %id, "cached message expired");
        }
    }
}

/// TTL-bounded, per-identity message store. Clones share the same store.
#[derive(Clone, Debug)]
pub struct OfflineCache {
    inner: Arc<CacheInner>,
}

impl OfflineCache {
    /// Create an empty cache whose messages live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                ttl,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Message time-to-live.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Store `payload` for `identity` and schedule its eviction one TTL from
    /// now. Must be called from within a Tokio runtime.
    pub fn put(&self, identity: &Identity, payload: Payload) -> MessageId {
        let id = MessageId::new();
        {
            let mut state = self.inner.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            let message = CachedMessage {
                id: id.clone(),
                payload,
                inserted_at: Utc::now(),
                seq,
            };
            let _ = state
                .entries
                .entry(identity.clone())
                .or_default()
                .insert(id.clone(), message);
        }
        counter!(MESSAGES_CACHED_TOTAL).increment(1);
        debug!(%identity, message_id = %id, "message cached");

        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let ttl = self.inner.ttl;
        let identity = identity.clone();
        let evict_id = id.clone();
        drop(tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = weak.upgrade() {
                inner.evict(&identity, &evict_id);
            }
        }));

        id
    }

    /// Remove and return everything cached for `identity`, earliest first.
    pub fn pop(&self, identity: &str) -> Vec<CachedMessage> {
        let removed = self.inner.state.lock().entries.remove(identity);
        let Some(entry) = removed else {
            return Vec::new();
        };
        let mut messages: Vec<CachedMessage> = entry.into_values().collect();
        messages.sort_by_key(|m| m.seq);
        debug!(identity, count = messages.len(), "popped cached messages");
        messages
    }

    /// Whether `identity` has any cached messages.
    pub fn contains(&self, identity: &str) -> bool {
        self.inner.state.lock().entries.contains_key(identity)
    }

    /// Number of messages cached for `identity`.
    pub fn len(&self, identity: &str) -> usize {
        self.inner
            .state
            .lock()
            .entries
            .get(identity)
            .map_or(0, HashMap::len)
    }

    /// Number of identities with at least one cached message.
    pub fn identity_count(&self) -> usize {
        self.inner.state.lock().entries.len()
    }
}
