//! Peer Presence
//!
//! Ephemeral presence aggregation for one document room. Presence is
//! published on change, dropped when the owning connection goes away, and
//! never persisted.
//!
//! The aggregator rebuilds its peer map wholesale from every incoming
//! snapshot instead of applying deltas, so a missed message can never
//! leave the map drifted: the next snapshot makes it correct again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transport::hub::ConnectionId;

/// Cursor position within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPos {
    pub line: u32,
    pub column: u32,
}

/// Presence payload for one connected replica.
///
/// Keyed by the transport-assigned connection id, not by user identity:
/// the same user in two windows appears as two peers, and a reconnect
/// produces a fresh peer entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerPresence {
    /// Transport-assigned connection id
    pub peer_id: ConnectionId,
    /// Display name shown next to the remote cursor
    pub display_name: String,
    /// Cursor/selection color (CSS color string)
    pub color: String,
    /// Last published cursor position, if any
    pub cursor: Option<CursorPos>,
}

/// The local replica's presence, before a connection id is attached.
///
/// Re-published under the new connection id after every reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfPresence {
    pub display_name: String,
    pub color: String,
    pub cursor: Option<CursorPos>,
}

impl SelfPresence {
    pub(crate) fn into_peer(self, peer_id: ConnectionId) -> PeerPresence {
        PeerPresence {
            peer_id,
            display_name: self.display_name,
            color: self.color,
            cursor: self.cursor,
        }
    }
}

type PeerCallback = Arc<dyn Fn(&[PeerPresence]) + Send + Sync>;

struct AggregatorInner {
    peers: RwLock<HashMap<ConnectionId, PeerPresence>>,
    listeners: Mutex<HashMap<Uuid, PeerCallback>>,
}

/// Aggregates room presence snapshots and fans out change notifications.
#[derive(Clone)]
pub struct PresenceAggregator {
    inner: Arc<AggregatorInner>,
}

impl PresenceAggregator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AggregatorInner {
                peers: RwLock::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Current peer list. Connections that have not published a presence
    /// payload are absent.
    pub fn peers(&self) -> Vec<PeerPresence> {
        match self.inner.peers.read() {
            Ok(peers) => peers.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        }
    }

    pub fn peer_count(&self) -> usize {
        match self.inner.peers.read() {
            Ok(peers) => peers.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Replace the peer map from a full room snapshot and notify listeners.
    pub(crate) fn replace_peers(&self, peers: Vec<PeerPresence>) {
        {
            let mut map = match self.inner.peers.write() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.clear();
            for peer in peers {
                map.insert(peer.peer_id, peer);
            }
        }
        self.notify();
    }

    /// Register a callback invoked with the full peer list on every change.
    ///
    /// The subscription unregisters the callback when dropped.
    pub fn on_peers_changed(
        &self,
        callback: impl Fn(&[PeerPresence]) + Send + Sync + 'static,
    ) -> PresenceSubscription {
        let id = Uuid::new_v4();
        let callback: PeerCallback = Arc::new(callback);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.insert(id, Arc::clone(&callback));
        }
        // Deliver the current state immediately so subscribers do not wait
        // for the next room change.
        callback(&self.peers());
        PresenceSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn notify(&self) {
        let snapshot = self.peers();
        let callbacks: Vec<PeerCallback> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(&snapshot);
        }
    }
}

impl Default for PresenceAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one presence callback registration.
pub struct PresenceSubscription {
    id: Uuid,
    inner: std::sync::Weak<AggregatorInner>,
}

impl PresenceSubscription {
    /// Explicitly unregister the callback. Equivalent to dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for PresenceSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut listeners) = inner.listeners.lock() {
                listeners.remove(&self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn peer(name: &str) -> PeerPresence {
        PeerPresence {
            peer_id: ConnectionId::new(),
            display_name: name.to_string(),
            color: "#aa3355".to_string(),
            cursor: None,
        }
    }

    #[test]
    fn test_snapshot_replaces_wholesale() {
        let aggregator = PresenceAggregator::new();
        aggregator.replace_peers(vec![peer("alice"), peer("bob")]);
        assert_eq!(aggregator.peer_count(), 2);

        let carol = peer("carol");
        aggregator.replace_peers(vec![carol.clone()]);
        assert_eq!(aggregator.peers(), vec![carol]);
    }

    #[test]
    fn test_callbacks_fire_on_subscribe_and_change() {
        let aggregator = PresenceAggregator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicUsize::new(0));

        let calls_cb = Arc::clone(&calls);
        let seen_cb = Arc::clone(&seen);
        let _sub = aggregator.on_peers_changed(move |peers| {
            calls_cb.fetch_add(1, Ordering::SeqCst);
            seen_cb.store(peers.len(), Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        aggregator.replace_peers(vec![peer("alice")]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_subscription_stops_callbacks() {
        let aggregator = PresenceAggregator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_cb = Arc::clone(&calls);
        let sub = aggregator.on_peers_changed(move |_| {
            calls_cb.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();

        aggregator.replace_peers(vec![peer("alice")]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_user_twice_is_two_peers() {
        let aggregator = PresenceAggregator::new();
        aggregator.replace_peers(vec![peer("alice"), peer("alice")]);
        assert_eq!(aggregator.peer_count(), 2);
    }
}
