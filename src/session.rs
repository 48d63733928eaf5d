//! Document Sessions
//!
//! One live replicated session per open file, owned by an explicitly
//! constructed registry and shared by reference. Opening the same file
//! twice yields the same session; a refcount tracks acquisitions and the
//! session is torn down when the count reaches zero.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::buffer::SharedBuffer;
use crate::config::CollabConfig;
use crate::error::SessionError;
use crate::transport::hub::SyncHub;
use crate::transport::{ConnectionState, TransportBinding};

/// One replicated document session.
///
/// Holds the buffer and its transport binding. All bridges bound to the
/// same file share this object.
pub struct DocumentSession {
    key: String,
    buffer: SharedBuffer,
    binding: Arc<TransportBinding>,
}

impl DocumentSession {
    /// The file key this session was opened for.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn transport(&self) -> Arc<TransportBinding> {
        Arc::clone(&self.binding)
    }
}

/// Diagnostic snapshot of one live session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub key: String,
    pub refcount: usize,
    pub state: ConnectionState,
    pub peer_count: usize,
}

struct SessionEntry {
    session: Arc<DocumentSession>,
    refcount: usize,
}

/// Registry owning every live [`DocumentSession`], keyed by file id.
///
/// Explicitly constructed and injectable: two registries never share
/// sessions, which keeps tests and embedders free of hidden global state.
#[derive(Clone)]
pub struct SessionRegistry {
    hub: SyncHub,
    config: CollabConfig,
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new(config: CollabConfig, hub: SyncHub) -> Self {
        Self {
            hub,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Acquire the session for `key`, creating it on first acquisition.
    ///
    /// Idempotent while the session is live: every acquisition returns the
    /// same session and bumps the refcount exactly once. On first
    /// acquisition the binding connects and runs initial sync before
    /// `initial_content` is considered; content already in the room always
    /// wins over the template. A transport failure is not fatal here; the
    /// session starts offline and the binding keeps retrying.
    pub async fn acquire(
        &self,
        key: &str,
        initial_content: &str,
    ) -> Result<Arc<DocumentSession>, SessionError> {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(key) {
            entry.refcount += 1;
            tracing::debug!(
                "[Session] reusing session for '{key}' (refcount {})",
                entry.refcount
            );
            return Ok(Arc::clone(&entry.session));
        }

        let buffer = SharedBuffer::new();
        let room = self.config.room_id(key);
        let binding = TransportBinding::new(self.hub.clone(), room, buffer.clone(), &self.config);
        if let Err(err) = binding.connect().await {
            tracing::warn!("[Session] transport unavailable for '{key}': {err}; starting offline");
        }
        buffer.seed_if_empty(initial_content)?;

        let session = Arc::new(DocumentSession {
            key: key.to_string(),
            buffer,
            binding,
        });
        sessions.insert(
            key.to_string(),
            SessionEntry {
                session: Arc::clone(&session),
                refcount: 1,
            },
        );
        tracing::info!("[Session] opened session for '{key}'");
        Ok(session)
    }

    /// Release one acquisition of `key`.
    ///
    /// At refcount zero the transport disconnects, presence is withdrawn,
    /// and the buffer is discarded. Releasing a key with no live session
    /// is a lifecycle misuse and fails fast rather than being absorbed.
    pub async fn release(&self, key: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let last = {
            let entry = sessions
                .get_mut(key)
                .ok_or_else(|| SessionError::LifecycleMisuse {
                    key: key.to_string(),
                })?;
            entry.refcount -= 1;
            entry.refcount == 0
        };
        if last {
            if let Some(entry) = sessions.remove(key) {
                entry.session.binding.shutdown().await;
            }
            tracing::info!("[Session] closed session for '{key}'");
        }
        Ok(())
    }

    /// Current refcount for a key, if a session is live.
    pub async fn refcount(&self, key: &str) -> Option<usize> {
        let sessions = self.sessions.read().await;
        sessions.get(key).map(|entry| entry.refcount)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.sessions.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Diagnostic snapshot of one live session.
    pub async fn session_info(&self, key: &str) -> Option<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions.get(key).map(|entry| SessionInfo {
            key: key.to_string(),
            refcount: entry.refcount,
            state: entry.session.binding.state(),
            peer_count: entry.session.binding.presence().peer_count(),
        })
    }
}
