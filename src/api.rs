//! Consumer API
//!
//! The surface the surrounding editor shell talks to: a two-phase core
//! that is initialized once and then opens, closes, and decorates document
//! sessions.
//!
//! ## Features
//!
//! - `CollabCore::initialize` - awaitable setup; a core that exists is
//!   ready, there is no half-initialized state to guard against
//! - `open_document_session` / `close_document_session` - refcounted open
//!   and close per file key
//! - `TransportHandle` - per-session handle for connection state, peers,
//!   presence, and visibility resume

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::buffer::SharedBuffer;
use crate::config::CollabConfig;
use crate::error::{InitError, SessionError};
use crate::presence::{CursorPos, PeerPresence, PresenceSubscription, SelfPresence};
use crate::session::{SessionInfo, SessionRegistry};
use crate::transport::hub::{ConnectionId, SyncHub};
use crate::transport::{ConnectionState, TransportBinding};

const PRESENCE_PALETTE: [&str; 8] = [
    "#e06c75", "#61afef", "#98c379", "#c678dd", "#d19a66", "#56b6c2", "#be5046", "#e5c07b",
];

/// Identity of the local user, supplied by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id (account id, not connection id)
    pub id: String,
    /// Name shown to other participants
    pub display_name: String,
}

/// Everything a consumer needs to render a newly opened document.
pub struct OpenedSession {
    /// Content after initial sync and seeding
    pub content: String,
    /// The replicated buffer, ready for bridge binding
    pub buffer: SharedBuffer,
    /// Handle to the session's transport and presence
    pub transport: TransportHandle,
}

/// Cheap cloneable handle to one session's transport.
#[derive(Clone)]
pub struct TransportHandle {
    binding: Arc<TransportBinding>,
    identity: Identity,
}

impl TransportHandle {
    pub fn state(&self) -> ConnectionState {
        self.binding.state()
    }

    /// Watch channel mirroring every connection state transition.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.binding.state_watch()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.binding.connection_id()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Current peer list for the session's room.
    pub fn peers(&self) -> Vec<PeerPresence> {
        self.binding.presence().peers()
    }

    /// Register a callback invoked with the full peer list on every
    /// presence change. Dropping the subscription unregisters it.
    pub fn subscribe_to_peers(
        &self,
        callback: impl Fn(&[PeerPresence]) + Send + Sync + 'static,
    ) -> PresenceSubscription {
        self.binding.presence().on_peers_changed(callback)
    }

    /// Publish the local display name, color, and cursor. Stored across
    /// disconnects and re-published after every reconnect.
    pub async fn set_self_presence(&self, presence: SelfPresence) {
        self.binding.set_self_presence(presence).await;
    }

    /// Convenience for cursor-only updates.
    pub async fn set_self_cursor(&self, cursor: Option<CursorPos>) {
        let presence = SelfPresence {
            display_name: self.identity.display_name.clone(),
            color: default_color(&self.identity.id).to_string(),
            cursor,
        };
        self.binding.set_self_presence(presence).await;
    }

    /// Visibility resume hook: attempt reconnection immediately instead of
    /// waiting for the next scheduled retry.
    pub fn resume(&self) {
        self.binding.resume();
    }
}

/// Entry point for embedding the collaboration core.
///
/// Construction is the initialization: `initialize` validates the
/// configuration and wires the registry before returning, so every method
/// on an existing core is safe to call.
pub struct CollabCore {
    config: CollabConfig,
    hub: SyncHub,
    registry: SessionRegistry,
}

impl CollabCore {
    /// Initialize a core with its own private signaling endpoint.
    pub async fn initialize(config: CollabConfig) -> Result<Self, InitError> {
        Self::initialize_with_hub(config, SyncHub::new()).await
    }

    /// Initialize a core attached to an existing endpoint. Several cores
    /// sharing one hub model several replicas of the same workspace.
    pub async fn initialize_with_hub(
        config: CollabConfig,
        hub: SyncHub,
    ) -> Result<Self, InitError> {
        config.validate()?;
        let registry = SessionRegistry::new(config.clone(), hub.clone());
        tracing::info!("[Core] initialized for workspace '{}'", config.workspace);
        Ok(Self {
            config,
            hub,
            registry,
        })
    }

    /// Open (or re-open) the session for `file_key`.
    ///
    /// Refcounted: a second open of the same key returns the same
    /// underlying session. `initial_content` seeds the buffer only when it
    /// is still empty after initial sync. The local presence is announced
    /// with a color derived from the user id.
    pub async fn open_document_session(
        &self,
        file_key: &str,
        initial_content: &str,
        identity: Identity,
    ) -> Result<OpenedSession, SessionError> {
        let session = self.registry.acquire(file_key, initial_content).await?;
        let handle = TransportHandle {
            binding: session.transport(),
            identity: identity.clone(),
        };
        handle
            .set_self_presence(SelfPresence {
                display_name: identity.display_name,
                color: default_color(&identity.id).to_string(),
                cursor: None,
            })
            .await;
        Ok(OpenedSession {
            content: session.buffer().content(),
            buffer: session.buffer().clone(),
            transport: handle,
        })
    }

    /// Close one acquisition of `file_key`. The session is torn down when
    /// the last acquisition closes; closing a key that is not open is a
    /// lifecycle misuse and returns an error.
    pub async fn close_document_session(&self, file_key: &str) -> Result<(), SessionError> {
        self.registry.release(file_key).await
    }

    /// Diagnostic snapshot of one live session.
    pub async fn session_info(&self, file_key: &str) -> Option<SessionInfo> {
        self.registry.session_info(file_key).await
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn hub(&self) -> &SyncHub {
        &self.hub
    }

    pub fn config(&self) -> &CollabConfig {
        &self.config
    }
}

/// Deterministic presence color for a user id.
fn default_color(user_id: &str) -> &'static str {
    let hash: usize = user_id.bytes().map(usize::from).sum();
    PRESENCE_PALETTE[hash % PRESENCE_PALETTE.len()]
}
