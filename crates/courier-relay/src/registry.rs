//! Subscription registry: identity to session slots.
//!
//! Every subscription gets a slot index from a per-identity counter that
//! only grows, so an index stays valid for the slot's whole lifetime even
//! as other sessions of the same identity come and go. A deactivated slot
//! is removed from the map. The registry is plain data; callers wrap it in
//! a lock.

use std::collections::{BTreeMap, HashMap};

use courier_core::Identity;
use courier_settings::DeliveryMode;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::Payload;
use crate::metrics::DELIVERY_DROPS_TOTAL;

#[derive(Debug, Default)]
struct IdentityEntry {
    next_index: usize,
    slots: BTreeMap<usize, mpsc::Sender<Payload>>,
}

/// A new session slot.
#[derive(Debug)]
pub struct Subscription {
    /// Stable slot index within the identity.
    pub index: usize,
    /// Receiving end of the slot's delivery channel.
    pub receiver: mpsc::Receiver<Payload>,
}

/// What the disconnect policy did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectAction {
    /// No active sessions; nothing to do.
    Nothing,
    /// The departing session was the only one; the identity was removed.
    Unsubscribed,
    /// Other sessions remain; only the departing slot was deactivated.
    Deactivated,
}

/// Delivery counts for one publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Sessions the payload was enqueued for.
    pub delivered: usize,
    /// Sessions skipped because their channel was full (drop mode only).
    pub dropped: usize,
}

/// Fan-out in progress: the sends that could be done without waiting are
/// done, the rest wait in [`Fanout::finish`].
#[derive(Debug)]
#[must_use = "a fan-out does nothing for full channels until finished"]
pub struct Fanout {
    report: PublishReport,
    payload: Payload,
    pending: Vec<(usize, mpsc::Sender<Payload>)>,
}

impl Fanout {
    /// Wait for every full channel to accept the payload.
    ///
    /// Call this after releasing the registry lock. A receiver closed in the
    /// meantime counts as neither delivered nor dropped.
    pub async fn finish(self) -> PublishReport {
        let mut report = self.report;
        for (index, sender) in self.pending {
            if sender.send(self.payload.clone()).await.is_ok() {
                report.delivered += 1;
            } else {
                debug!(index, "session closed before delivery");
            }
        }
        report
    }

    /// Whether any send is still waiting on a full channel.
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Identity to session slot mapping.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    entries: HashMap<Identity, IdentityEntry>,
    channel_capacity: usize,
    mode: DeliveryMode,
}

impl SubscriptionRegistry {
    /// Create an empty registry. Each slot gets a channel of
    /// `channel_capacity` (at least 1).
    pub fn new(channel_capacity: usize, mode: DeliveryMode) -> Self {
        Self {
            entries: HashMap::new(),
            channel_capacity: channel_capacity.max(1),
            mode,
        }
    }

    /// Add an active slot for `identity`.
    pub fn subscribe(&mut self, identity: &Identity) -> Subscription {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let entry = self.entries.entry(identity.clone()).or_default();
        let index = entry.next_index;
        entry.next_index += 1;
        let _ = entry.slots.insert(index, tx);
        debug!(%identity, index, "session subscribed");
        Subscription {
            index,
            receiver: rx,
        }
    }

    /// Enqueue `payload` for every active slot of `identity`.
    ///
    /// Channels with room are filled immediately. Full channels are either
    /// skipped and counted (drop mode) or handed back in the [`Fanout`] to
    /// be awaited once the caller has released its lock (blocking mode).
    pub fn publish(&self, identity: &str, payload: Payload) -> Fanout {
        let mut fanout = Fanout {
            report: PublishReport::default(),
            payload,
            pending: Vec::new(),
        };
        let Some(entry) = self.entries.get(identity) else {
            return fanout;
        };

        for (&index, sender) in &entry.slots {
            match sender.try_send(fanout.payload.clone()) {
                Ok(()) => fanout.report.delivered += 1,
                Err(TrySendError::Full(_)) => match self.mode {
                    DeliveryMode::Blocking => fanout.pending.push((index, sender.clone())),
                    DeliveryMode::Drop => {
                        fanout.report.dropped += 1;
                        counter!(DELIVERY_DROPS_TOTAL).increment(1);
                        warn!(identity, index, "session channel full, message dropped");
                    }
                },
                Err(TrySendError::Closed(_)) => {
                    debug!(identity, index, "session channel closed, skipping");
                }
            }
        }
        fanout
    }

    /// Number of active slots for `identity`.
    pub fn active_count(&self, identity: &str) -> usize {
        self.entries.get(identity).map_or(0, |e| e.slots.len())
    }

    /// Deactivate one slot. Other slots keep their indices.
    pub fn deactivate(&mut self, identity: &str, index: usize) {
        if let Some(entry) = self.entries.get_mut(identity) {
            let _ = entry.slots.remove(&index);
        }
    }

    /// Remove `identity` and all of its slots.
    pub fn unsubscribe_all(&mut self, identity: &str) {
        let _ = self.entries.remove(identity);
    }

    /// Release the slot of a departing session.
    ///
    /// With no active sessions this does nothing. With exactly one, the
    /// whole identity is removed. Otherwise only `index` is deactivated.
    pub fn disconnect(&mut self, identity: &str, index: usize) -> DisconnectAction {
        match self.active_count(identity) {
            0 => DisconnectAction::Nothing,
            1 => {
                self.unsubscribe_all(identity);
                DisconnectAction::Unsubscribed
            }
            _ => {
                self.deactivate(identity, index);
                DisconnectAction::Deactivated
            }
        }
    }

    /// Whether `identity` has a registry entry.
    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    /// All identities with a registry entry.
    pub fn identities(&self) -> Vec<Identity> {
        self.entries.keys().cloned().collect()
    }

    /// Number of identities with a registry entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Active session count per identity.
    pub fn session_counts(&self) -> BTreeMap<String, usize> {
        self.entries
            .iter()
            .map(|(identity, entry)| (identity.to_string(), entry.slots.len()))
            .collect()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(64, DeliveryMode::Blocking)
    }
}
