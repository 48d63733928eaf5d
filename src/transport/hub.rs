//! Sync Hub
//!
//! In-process rendezvous point standing in for the signaling service. Each
//! room fans document updates and presence snapshots out to its members
//! over a broadcast channel and keeps an update backlog so a late joiner
//! receives the room's full history as its initial sync.
//!
//! The hub can be switched offline to exercise the transport's failure
//! handling: joins are refused and publishes fail until it comes back.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::TransportError;
use crate::presence::PeerPresence;

const ROOM_CHANNEL_CAPACITY: usize = 512;

/// Transport-assigned identity for one joined connection.
///
/// A reconnect produces a fresh id; presence is keyed by this, never by
/// user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events fanned out to every member of a room.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A document update published by one member.
    Update {
        from: ConnectionId,
        bytes: Vec<u8>,
    },
    /// Authoritative full presence snapshot for the room.
    PresenceChanged { peers: Vec<PeerPresence> },
}

/// What a member gets back from a successful join.
pub struct RoomConnection {
    /// The id assigned to this connection
    pub id: ConnectionId,
    /// Live event stream, subscribed before the backlog was captured
    pub events: broadcast::Receiver<RoomEvent>,
    /// Every update published to the room so far, in publish order
    pub backlog: Vec<Vec<u8>>,
    /// Presence snapshot at join time
    pub peers: Vec<PeerPresence>,
}

struct Room {
    tx: broadcast::Sender<RoomEvent>,
    backlog: Vec<Vec<u8>>,
    presence: HashMap<ConnectionId, PeerPresence>,
    members: HashSet<ConnectionId>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        Self {
            tx,
            backlog: Vec::new(),
            presence: HashMap::new(),
            members: HashSet::new(),
        }
    }

    fn peer_snapshot(&self) -> Vec<PeerPresence> {
        self.presence.values().cloned().collect()
    }

    fn broadcast_presence(&self) {
        let _ = self.tx.send(RoomEvent::PresenceChanged {
            peers: self.peer_snapshot(),
        });
    }
}

struct HubInner {
    rooms: RwLock<HashMap<String, Room>>,
    offline: AtomicBool,
}

/// Shared handle to the in-process signaling endpoint.
#[derive(Clone)]
pub struct SyncHub {
    inner: Arc<HubInner>,
}

impl SyncHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                rooms: RwLock::new(HashMap::new()),
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// Simulate losing or regaining the signaling endpoint.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
        tracing::info!(
            "[Hub] endpoint {}",
            if offline { "offline" } else { "online" }
        );
    }

    pub fn is_offline(&self) -> bool {
        self.inner.offline.load(Ordering::SeqCst)
    }

    /// Join a room, creating it on first use.
    ///
    /// The event subscription and the backlog snapshot are taken under the
    /// same lock, so no update can fall between them.
    pub async fn join(&self, room_id: &str) -> Result<RoomConnection, TransportError> {
        if self.is_offline() {
            return Err(TransportError::ConnectionRefused {
                room: room_id.to_string(),
            });
        }
        let mut rooms = self.inner.rooms.write().await;
        let room = rooms.entry(room_id.to_string()).or_insert_with(Room::new);
        let id = ConnectionId::new();
        room.members.insert(id);
        tracing::debug!("[Hub] {id} joined room {room_id} ({} members)", room.members.len());
        Ok(RoomConnection {
            id,
            events: room.tx.subscribe(),
            backlog: room.backlog.clone(),
            peers: room.peer_snapshot(),
        })
    }

    /// Leave a room, dropping the connection's presence entry and pushing
    /// a fresh snapshot to the remaining members.
    pub async fn leave(&self, room_id: &str, conn: ConnectionId) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(room) = rooms.get_mut(room_id) {
            room.members.remove(&conn);
            if room.presence.remove(&conn).is_some() {
                room.broadcast_presence();
            }
            tracing::debug!("[Hub] {conn} left room {room_id} ({} members)", room.members.len());
        }
    }

    /// Publish a document update to a room. The update is appended to the
    /// backlog for future joiners and fanned out to current members,
    /// including the sender.
    pub async fn publish_update(
        &self,
        room_id: &str,
        from: ConnectionId,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError> {
        if self.is_offline() {
            return Err(TransportError::NotConnected);
        }
        let mut rooms = self.inner.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(TransportError::NotConnected)?;
        room.backlog.push(bytes.clone());
        let _ = room.tx.send(RoomEvent::Update { from, bytes });
        Ok(())
    }

    /// Publish the presence payload for one connection and fan out the
    /// resulting full snapshot.
    pub async fn publish_presence(
        &self,
        room_id: &str,
        conn: ConnectionId,
        presence: PeerPresence,
    ) -> Result<(), TransportError> {
        if self.is_offline() {
            return Err(TransportError::NotConnected);
        }
        let mut rooms = self.inner.rooms.write().await;
        let room = rooms.get_mut(room_id).ok_or(TransportError::NotConnected)?;
        room.presence.insert(conn, presence);
        room.broadcast_presence();
        Ok(())
    }

    /// Number of live connections in a room.
    pub async fn member_count(&self, room_id: &str) -> usize {
        let rooms = self.inner.rooms.read().await;
        rooms.get(room_id).map(|r| r.members.len()).unwrap_or(0)
    }

    /// Number of updates in a room's backlog.
    pub async fn backlog_len(&self, room_id: &str) -> usize {
        let rooms = self.inner.rooms.read().await;
        rooms.get(room_id).map(|r| r.backlog.len()).unwrap_or(0)
    }

    /// Current presence snapshot for a room.
    pub async fn peer_snapshot(&self, room_id: &str) -> Vec<PeerPresence> {
        let rooms = self.inner.rooms.read().await;
        rooms
            .get(room_id)
            .map(|r| r.peer_snapshot())
            .unwrap_or_default()
    }
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new()
    }
}
