//! Network Session Binding
//!
//! Glue between one replicated buffer and its room: a connection state
//! machine with automatic reconnect, plus the outbound and inbound update
//! pumps.
//!
//! ## State Machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!                     |             |
//!                     v             v
//!                Reconnecting <-----+   (dropped link / publish failure)
//!                     |
//!                     +--> Connected    (successful retry)
//! ```
//!
//! `Disconnected` is terminal and only reached through explicit teardown.
//! Reconnect attempts are unbounded with capped exponential backoff; a
//! visibility resume skips the pending delay instead of waiting it out.
//!
//! While disconnected, editing continues against the local buffer. On
//! rejoin the binding replays the room backlog into the buffer and
//! publishes a full snapshot of its own state; imports are idempotent, so
//! the overlap between snapshot and backlog is harmless.

pub mod backoff;
pub mod hub;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use loro::VersionVector;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;

use crate::buffer::SharedBuffer;
use crate::config::CollabConfig;
use crate::error::TransportError;
use crate::presence::{PresenceAggregator, SelfPresence};
use backoff::ReconnectBackoff;
use hub::{ConnectionId, RoomEvent, SyncHub};

/// Connection lifecycle state of one session binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none pending. Initial and terminal state.
    Disconnected,
    /// First connection attempt in flight.
    Connecting,
    /// Live connection to the room.
    Connected,
    /// Connection lost; retrying with backoff.
    Reconnecting,
}

/// Binds one [`SharedBuffer`] to one room on a [`SyncHub`].
///
/// Constructed once per document session and torn down exactly once via
/// [`Self::shutdown`] when the session's refcount reaches zero.
pub struct TransportBinding {
    room: String,
    hub: SyncHub,
    buffer: SharedBuffer,
    presence: PresenceAggregator,
    state_tx: watch::Sender<ConnectionState>,
    conn_id: Mutex<Option<ConnectionId>>,
    local_presence: Mutex<Option<SelfPresence>>,
    last_sent: Mutex<VersionVector>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    send_task: Mutex<Option<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    resume_notify: Notify,
    reconnect_running: AtomicBool,
    shutting_down: AtomicBool,
    backoff_initial: Duration,
    backoff_max: Duration,
    me: Weak<TransportBinding>,
}

impl TransportBinding {
    pub fn new(
        hub: SyncHub,
        room: String,
        buffer: SharedBuffer,
        config: &CollabConfig,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let initial_version = buffer.version();
        let binding = Arc::new_cyclic(|me| Self {
            room,
            hub,
            buffer,
            presence: PresenceAggregator::new(),
            state_tx,
            conn_id: Mutex::new(None),
            local_presence: Mutex::new(None),
            last_sent: Mutex::new(initial_version),
            recv_task: Mutex::new(None),
            send_task: Mutex::new(None),
            reconnect_task: Mutex::new(None),
            resume_notify: Notify::new(),
            reconnect_running: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            backoff_initial: config.reconnect_initial_delay,
            backoff_max: config.reconnect_max_delay,
            me: me.clone(),
        });
        binding.spawn_outbound_pump();
        binding
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch channel mirroring every state transition.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        *lock(&self.conn_id)
    }

    pub fn presence(&self) -> &PresenceAggregator {
        &self.presence
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    /// First connection attempt for this binding.
    ///
    /// Failure is not fatal: the binding moves to `Reconnecting` and keeps
    /// retrying in the background while the caller proceeds offline.
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.state_tx.send_replace(ConnectionState::Connecting);
        match self.try_join().await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(
                    "[Transport] initial connect to room {} failed: {err}; retrying in background",
                    self.room
                );
                self.state_tx.send_replace(ConnectionState::Reconnecting);
                self.spawn_reconnect_loop();
                Err(err)
            }
        }
    }

    /// Join the room, run initial sync, announce local state, and start
    /// the inbound pump.
    async fn try_join(&self) -> Result<(), TransportError> {
        let conn = self.hub.join(&self.room).await?;

        // Initial sync: the room backlog is authoritative over any local
        // template content and must land before seeding decisions.
        for bytes in &conn.backlog {
            if let Err(err) = self.buffer.apply_remote(bytes) {
                tracing::warn!("[Transport] dropping malformed backlog update: {err}");
            }
        }
        self.presence.replace_peers(conn.peers);

        // Announce everything this replica accumulated while offline. The
        // version is read under the same lock as the snapshot and becomes
        // the high-water mark only once the publish succeeded, so a failed
        // publish or an edit racing the export stays pending.
        match self.buffer.snapshot_with_version() {
            Ok((snapshot, version)) => {
                if !self.buffer.is_empty() {
                    if let Err(err) =
                        self.hub.publish_update(&self.room, conn.id, snapshot).await
                    {
                        tracing::warn!(
                            "[Transport] state announce for room {} failed: {err}",
                            self.room
                        );
                        self.hub.leave(&self.room, conn.id).await;
                        return Err(err);
                    }
                }
                *lock(&self.last_sent) = version;
            }
            Err(err) => {
                tracing::warn!("[Transport] could not export state for announce: {err}");
            }
        }

        *lock(&self.conn_id) = Some(conn.id);
        self.state_tx.send_replace(ConnectionState::Connected);
        tracing::info!("[Transport] connected to room {} as {}", self.room, conn.id);

        // Edits committed while the announce was in flight were skipped by
        // the outbound pump; flush them now that the state is live.
        let baseline = lock(&self.last_sent).clone();
        if let Some((bytes, version)) = self.buffer.updates_since_with_version(&baseline) {
            if self
                .hub
                .publish_update(&self.room, conn.id, bytes)
                .await
                .is_ok()
            {
                *lock(&self.last_sent) = version;
            }
        }

        // Presence does not survive a connection; re-publish under the
        // new connection id.
        let local = lock(&self.local_presence).clone();
        if let Some(local) = local {
            let _ = self
                .hub
                .publish_presence(&self.room, conn.id, local.into_peer(conn.id))
                .await;
        }

        self.spawn_inbound_pump(conn.events, conn.id);
        Ok(())
    }

    /// Handle a dropped link while connected: release the old connection,
    /// move to `Reconnecting`, and start retrying. Never gives up on its
    /// own; only [`Self::shutdown`] ends the loop.
    pub fn connection_lost(&self) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        if self.state() == ConnectionState::Reconnecting {
            return;
        }
        let old = lock(&self.conn_id).take();
        self.state_tx.send_replace(ConnectionState::Reconnecting);
        tracing::warn!("[Transport] connection to room {} lost", self.room);
        if let Some(id) = old {
            let hub = self.hub.clone();
            let room = self.room.clone();
            tokio::spawn(async move {
                hub.leave(&room, id).await;
            });
        }
        self.spawn_reconnect_loop();
    }

    /// Visibility resume hook: connect immediately instead of waiting for
    /// the next scheduled retry. No-op while connected.
    pub fn resume(&self) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        match self.state() {
            ConnectionState::Connected | ConnectionState::Connecting => {}
            ConnectionState::Reconnecting => self.resume_notify.notify_one(),
            ConnectionState::Disconnected => {
                if let Some(this) = self.me.upgrade() {
                    tokio::spawn(async move {
                        let _ = this.connect().await;
                    });
                }
            }
        }
    }

    /// Update and publish the local presence payload. Stored regardless of
    /// connection state and re-published after every reconnect.
    pub async fn set_self_presence(&self, presence: SelfPresence) {
        *lock(&self.local_presence) = Some(presence.clone());
        let conn = self.connection_id();
        if let Some(id) = conn {
            if let Err(err) = self
                .hub
                .publish_presence(&self.room, id, presence.into_peer(id))
                .await
            {
                tracing::debug!("[Presence] publish deferred until reconnect: {err}");
            }
        }
    }

    /// Tear the binding down. Terminal: aborts every pump, leaves the
    /// room, and settles in `Disconnected`.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.state_tx.send_replace(ConnectionState::Disconnected);
        self.resume_notify.notify_one();
        self.abort_tasks();
        if let Some(id) = lock(&self.conn_id).take() {
            self.hub.leave(&self.room, id).await;
        }
        self.presence.replace_peers(Vec::new());
        tracing::info!("[Transport] binding for room {} shut down", self.room);
    }

    /// Forward local buffer mutations to the room as incremental updates.
    fn spawn_outbound_pump(&self) {
        let Some(this) = self.me.upgrade() else {
            return;
        };
        let mut rx = self.buffer.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if !event.origin.is_local() {
                            continue;
                        }
                        if this.state() != ConnectionState::Connected {
                            // Covered by the snapshot sent on reconnect.
                            continue;
                        }
                        let Some(conn) = this.connection_id() else {
                            continue;
                        };
                        let from = lock(&this.last_sent).clone();
                        let Some((bytes, version)) =
                            this.buffer.updates_since_with_version(&from)
                        else {
                            continue;
                        };
                        match this.hub.publish_update(&this.room, conn, bytes).await {
                            Ok(()) => {
                                *lock(&this.last_sent) = version;
                            }
                            Err(err) => {
                                tracing::warn!("[Transport] publish failed: {err}");
                                this.connection_lost();
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("[Transport] outbound pump lagged by {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        if let Some(previous) = lock(&self.send_task).replace(handle) {
            previous.abort();
        }
    }

    /// Apply room events to the buffer and presence aggregator, skipping
    /// updates this connection published itself.
    fn spawn_inbound_pump(&self, mut rx: broadcast::Receiver<RoomEvent>, my_id: ConnectionId) {
        let Some(this) = self.me.upgrade() else {
            return;
        };
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(RoomEvent::Update { from, bytes }) => {
                        if from == my_id {
                            continue;
                        }
                        if let Err(err) = this.buffer.apply_remote(&bytes) {
                            tracing::warn!("[Transport] dropping malformed remote update: {err}");
                        }
                    }
                    Ok(RoomEvent::PresenceChanged { peers }) => {
                        this.presence.replace_peers(peers);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("[Transport] inbound pump lagged by {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        if !this.shutting_down.load(Ordering::SeqCst) {
                            this.connection_lost();
                        }
                        break;
                    }
                }
            }
        });
        if let Some(previous) = lock(&self.recv_task).replace(handle) {
            previous.abort();
        }
    }

    /// Retry joining until it succeeds or the binding shuts down. Only one
    /// loop runs at a time.
    fn spawn_reconnect_loop(&self) {
        if self.reconnect_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(this) = self.me.upgrade() else {
            self.reconnect_running.store(false, Ordering::SeqCst);
            return;
        };
        let handle = tokio::spawn(async move {
            let mut backoff = ReconnectBackoff::new(this.backoff_initial, this.backoff_max);
            loop {
                if this.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                let delay = backoff.next_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = this.resume_notify.notified() => {
                        tracing::debug!("[Transport] resume requested; skipping backoff delay");
                    }
                }
                if this.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                match this.try_join().await {
                    Ok(()) => {
                        tracing::info!(
                            "[Transport] reconnected to room {} after {} attempt(s)",
                            this.room,
                            backoff.attempt()
                        );
                        break;
                    }
                    Err(err) => {
                        tracing::debug!(
                            "[Transport] reconnect attempt {} failed: {err}",
                            backoff.attempt()
                        );
                    }
                }
            }
            this.reconnect_running.store(false, Ordering::SeqCst);
        });
        // One slot per concern: the previous loop has already finished
        // (guarded by `reconnect_running`), so replacing its handle keeps
        // the task set bounded across any number of link flaps.
        if let Some(previous) = lock(&self.reconnect_task).replace(handle) {
            previous.abort();
        }
    }

    fn abort_tasks(&self) {
        for slot in [&self.send_task, &self.reconnect_task, &self.recv_task] {
            if let Some(task) = lock(slot).take() {
                task.abort();
            }
        }
    }
}

impl Drop for TransportBinding {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
