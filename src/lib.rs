//! # coedit
//!
//! Document synchronization core for a collaborative code editor. Keeps a
//! replicated text buffer per open file, binds editor views to it without
//! echo loops, aggregates ephemeral peer presence, scopes undo to local
//! operations, and rides out connection loss with automatic reconnect.
//!
//! ## Architecture
//!
//! ```text
//! CollabCore
//!   └── SessionRegistry          refcounted, one session per file key
//!         └── DocumentSession
//!               ├── SharedBuffer     replicated text (CRDT)
//!               │     ├── EditorBridge(s)   view <-> buffer, echo-suppressed
//!               │     └── UndoCoordinator   local-only undo/redo
//!               └── TransportBinding  connect/reconnect state machine
//!                     ├── SyncHub            room rendezvous + backlog
//!                     └── PresenceAggregator peer map from snapshots
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use coedit::{CollabConfig, CollabCore, Identity};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let core = CollabCore::initialize(CollabConfig::default()).await?;
//! let opened = core
//!     .open_document_session(
//!         "src/main.rs",
//!         "fn main() {}\n",
//!         Identity {
//!             id: "user-1".to_string(),
//!             display_name: "Alice".to_string(),
//!         },
//!     )
//!     .await?;
//! println!("synced content: {}", opened.content);
//! core.close_document_session("src/main.rs").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod bridge;
pub mod buffer;
pub mod config;
pub mod diff;
pub mod error;
pub mod presence;
pub mod session;
pub mod transport;
pub mod undo;

pub use api::{CollabCore, Identity, OpenedSession, TransportHandle};
pub use bridge::{BridgeSettings, EditorBridge, EditorView};
pub use buffer::{BridgeId, BufferEvent, BufferObserver, EditOrigin, SharedBuffer};
pub use config::{CollabConfig, CollabConfigBuilder};
pub use diff::{apply_change, minimal_change, TextChange};
pub use error::{BufferError, ConfigError, InitError, SessionError, TransportError};
pub use presence::{
    CursorPos, PeerPresence, PresenceAggregator, PresenceSubscription, SelfPresence,
};
pub use session::{DocumentSession, SessionInfo, SessionRegistry};
pub use transport::backoff::ReconnectBackoff;
pub use transport::hub::{ConnectionId, RoomConnection, RoomEvent, SyncHub};
pub use transport::{ConnectionState, TransportBinding};
pub use undo::UndoCoordinator;
