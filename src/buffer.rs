//! Replicated Text Buffer
//!
//! One conflict-free replicated text document per open file, shared by
//! every editor bridge bound to that file. Concurrent edits from other
//! replicas merge without manual conflict resolution; replicas that have
//! seen the same set of operations converge to identical content.
//!
//! ## Features
//!
//! - Atomic local transactions (delete + insert as one operation)
//! - Remote update import with drop-and-log handling for malformed input
//! - Seed-iff-empty semantics so template content never clobbers a peer's
//!   document
//! - Mutation events tagged with their origin for echo suppression,
//!   delivered synchronously to observers and asynchronously to channel
//!   subscribers
//! - Incremental update export against a known version vector

use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex, Weak};

use loro::{ExportMode, LoroDoc, LoroText, VersionVector};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::BufferError;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const TEXT_CONTAINER: &str = "content";

/// Identifies one bound editor (or undo coordinator) for echo suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeId(Uuid);

impl BridgeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BridgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BridgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Origin tag attached to every edit crossing the buffer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    /// Produced by a local actor (a bound view or the undo coordinator).
    /// Forwarded to the transport for replication.
    Local(BridgeId),
    /// Merged from a remote peer or applied programmatically. Must never
    /// be fed back into the buffer as a new operation.
    Remote,
}

impl EditOrigin {
    pub fn is_local(&self) -> bool {
        matches!(self, EditOrigin::Local(_))
    }
}

/// A mutation event emitted by the buffer.
///
/// Carries the resulting content so subscribers can compare by value
/// instead of trusting the notification alone.
#[derive(Debug, Clone)]
pub struct BufferEvent {
    pub origin: EditOrigin,
    pub content: String,
}

struct BufferInner {
    doc: LoroDoc,
    text: LoroText,
}

type ObserverCallback = Arc<dyn Fn(&BufferEvent) + Send + Sync>;
type ObserverMap = Mutex<HashMap<Uuid, ObserverCallback>>;

/// Unregisters its observer when dropped.
pub struct BufferObserver {
    id: Uuid,
    observers: Weak<ObserverMap>,
}

impl Drop for BufferObserver {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            guard(&observers).remove(&self.id);
        }
    }
}

/// Shared handle to one replicated text document.
///
/// Cloning is cheap and every clone refers to the same document.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<Mutex<BufferInner>>,
    events: broadcast::Sender<BufferEvent>,
    observers: Arc<ObserverMap>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        let doc = LoroDoc::new();
        let text = doc.get_text(TEXT_CONTAINER);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(BufferInner { doc, text })),
            events,
            observers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to mutation events over a channel. Delivery is
    /// asynchronous; the transport pumps consume this side.
    pub fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.events.subscribe()
    }

    /// Register a callback invoked synchronously for every mutation, on
    /// the thread that performed it and before the mutating call returns.
    /// Bound views consume this side so they are never behind the buffer
    /// when the host reports the next user edit.
    ///
    /// The callback must not mutate the buffer.
    pub fn observe(
        &self,
        callback: impl Fn(&BufferEvent) + Send + Sync + 'static,
    ) -> BufferObserver {
        let id = Uuid::new_v4();
        guard(&self.observers).insert(id, Arc::new(callback));
        BufferObserver {
            id,
            observers: Arc::downgrade(&self.observers),
        }
    }

    /// Current content of the document.
    pub fn content(&self) -> String {
        self.lock().text.to_string()
    }

    /// Document length in chars.
    pub fn len_chars(&self) -> usize {
        self.lock().text.len_unicode()
    }

    pub fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }

    /// Version vector covering every operation this replica has seen.
    pub fn version(&self) -> VersionVector {
        self.lock().doc.oplog_vv()
    }

    /// Replace `range` (char offsets) with `insert` as one atomic
    /// transaction and emit a local-origin event.
    pub fn apply_local_change(
        &self,
        range: Range<usize>,
        insert: &str,
        origin: BridgeId,
    ) -> Result<(), BufferError> {
        let content = {
            let inner = self.lock();
            let len = inner.text.len_unicode();
            if range.start > range.end || range.end > len {
                return Err(BufferError::RangeOutOfBounds {
                    start: range.start,
                    end: range.end,
                    len,
                });
            }
            if range.end > range.start {
                inner
                    .text
                    .delete(range.start, range.end - range.start)
                    .map_err(local_apply_error)?;
            }
            if !insert.is_empty() {
                inner
                    .text
                    .insert(range.start, insert)
                    .map_err(local_apply_error)?;
            }
            inner.doc.commit();
            inner.text.to_string()
        };
        self.emit(BufferEvent {
            origin: EditOrigin::Local(origin),
            content,
        });
        Ok(())
    }

    /// Import an update received from a remote peer.
    ///
    /// Imports are idempotent: re-applying operations the document has
    /// already seen changes nothing. A malformed update is rejected and the
    /// error returned; the caller logs and drops it, never retries.
    ///
    /// Returns whether the document actually changed.
    pub fn apply_remote(&self, bytes: &[u8]) -> Result<bool, BufferError> {
        let (changed, content) = {
            let inner = self.lock();
            let before = inner.doc.oplog_vv();
            inner.doc.import(bytes).map_err(|err| BufferError::MalformedUpdate {
                message: err.to_string(),
            })?;
            let changed = inner.doc.oplog_vv() != before;
            (changed, inner.text.to_string())
        };
        if changed {
            self.emit(BufferEvent {
                origin: EditOrigin::Remote,
                content,
            });
        }
        Ok(changed)
    }

    /// Seed the document with template content only if it is still empty.
    ///
    /// Content already present (typically merged from a peer during initial
    /// sync) always wins over the template. Returns whether seeding
    /// happened.
    pub fn seed_if_empty(&self, initial: &str) -> Result<bool, BufferError> {
        if initial.is_empty() {
            return Ok(false);
        }
        let content = {
            let inner = self.lock();
            if inner.text.len_unicode() > 0 {
                return Ok(false);
            }
            inner
                .text
                .insert(0, initial)
                .map_err(local_apply_error)?;
            inner.doc.commit();
            inner.text.to_string()
        };
        self.emit(BufferEvent {
            origin: EditOrigin::Local(BridgeId::new()),
            content,
        });
        Ok(true)
    }

    /// Export the full document state.
    pub fn snapshot(&self) -> Result<Vec<u8>, BufferError> {
        self.snapshot_with_version().map(|(bytes, _)| bytes)
    }

    /// Export the full document state together with the exact version
    /// vector it covers, read under one lock. A sender that advances its
    /// high-water mark to this version after publishing the snapshot can
    /// never skip an operation that raced the export.
    pub fn snapshot_with_version(&self) -> Result<(Vec<u8>, VersionVector), BufferError> {
        let inner = self.lock();
        let version = inner.doc.oplog_vv();
        let bytes = inner
            .doc
            .export(ExportMode::Snapshot)
            .map_err(|err| BufferError::Export {
                message: err.to_string(),
            })?;
        Ok((bytes, version))
    }

    /// Export the operations the given version vector has not seen yet.
    ///
    /// Returns `None` when there is nothing new to send.
    pub fn updates_since(&self, from: &VersionVector) -> Option<Vec<u8>> {
        self.updates_since_with_version(from).map(|(bytes, _)| bytes)
    }

    /// Like [`Self::updates_since`], but also returns the version vector
    /// the export covers, read under the same lock as the export.
    pub fn updates_since_with_version(
        &self,
        from: &VersionVector,
    ) -> Option<(Vec<u8>, VersionVector)> {
        let inner = self.lock();
        let version = inner.doc.oplog_vv();
        if version == *from {
            return None;
        }
        let bytes = inner
            .doc
            .export(ExportMode::Updates {
                from: Cow::Owned(from.clone()),
            })
            .ok()?;
        if bytes.is_empty() {
            None
        } else {
            Some((bytes, version))
        }
    }

    /// Emit a local-origin event for a mutation performed directly on the
    /// underlying document. Undo and redo go through the document's own
    /// history, not through [`Self::apply_local_change`].
    pub(crate) fn notify_local_mutation(&self, origin: BridgeId) {
        let content = self.content();
        self.emit(BufferEvent {
            origin: EditOrigin::Local(origin),
            content,
        });
    }

    /// Deliver an event to every observer, then to channel subscribers.
    /// Called with the document lock released.
    fn emit(&self, event: BufferEvent) {
        let callbacks: Vec<ObserverCallback> =
            guard(&self.observers).values().cloned().collect();
        for callback in callbacks {
            callback(&event);
        }
        let _ = self.events.send(event);
    }

    /// Run `f` with the underlying document.
    pub(crate) fn with_doc<R>(&self, f: impl FnOnce(&LoroDoc) -> R) -> R {
        let inner = self.lock();
        f(&inner.doc)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufferInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn local_apply_error(err: loro::LoroError) -> BufferError {
    BufferError::LocalApply {
        message: err.to_string(),
    }
}

fn guard<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}
