//! Editor Bridge
//!
//! Bidirectional binding between one interactive editor view and a shared
//! buffer. Multiple bridges may bind the same buffer (split panes, two
//! windows onto one file); each carries its own id for echo suppression.
//!
//! ## Edit Flow
//!
//! - View to buffer: the host calls [`EditorBridge::on_view_edit`] after a
//!   user edit; the bridge diffs the view against the buffer and applies
//!   the delta as one atomic transaction tagged with its own id.
//! - Buffer to view: a synchronous observer applies every buffer event
//!   that did not originate from this bridge as a minimal targeted
//!   replacement, after confirming by value that the view actually
//!   differs. The observer runs before the mutating call returns, so the
//!   view is never behind the buffer when the host reports the next edit;
//!   a deferred apply would let `on_view_edit` misread a pending remote
//!   insert as a local deletion and replicate it.
//!
//! The double guard (origin tag plus content comparison) is what breaks
//! the echo cycle: a bridge never re-applies its own transaction, and a
//! value-identical update touches nothing.

use std::sync::{Arc, Mutex, RwLock};

use crate::buffer::{BridgeId, BufferObserver, EditOrigin, SharedBuffer};
use crate::diff::{minimal_change, TextChange};
use crate::error::BufferError;

/// The seam to the host's text-editing view. Positions are char offsets.
///
/// Implementations receive the origin of every programmatic mutation so
/// they can suppress their own change notifications for merged edits.
pub trait EditorView: Send + 'static {
    /// Full current content of the view.
    fn content(&self) -> String;

    /// Apply a single replacement.
    fn apply_change(&mut self, change: &TextChange, origin: EditOrigin);

    /// Replace the entire content.
    fn set_content(&mut self, content: &str, origin: EditOrigin);

    /// Current cursor position (chars).
    fn cursor(&self) -> usize;

    fn set_cursor(&mut self, pos: usize);

    /// Give the view input focus.
    fn focus(&mut self);
}

/// Per-bind settings, passed explicitly to [`EditorBridge::bind`] and
/// changed via [`EditorBridge::update_settings`].
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Keep the local cursor position stable across merged remote edits.
    pub preserve_cursor: bool,
    /// Drop view edits instead of feeding them into the buffer. Remote
    /// edits still flow into the view.
    pub read_only: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            preserve_cursor: true,
            read_only: false,
        }
    }
}

/// Binding between one view and one buffer.
///
/// Dropping (or [`Self::unbind`]) detaches the view; the buffer is
/// untouched since other bridges may still share it.
pub struct EditorBridge<V: EditorView> {
    id: BridgeId,
    view: Arc<Mutex<V>>,
    buffer: SharedBuffer,
    settings: Arc<RwLock<BridgeSettings>>,
    _observer: BufferObserver,
}

impl<V: EditorView> EditorBridge<V> {
    /// Bind a view to a buffer.
    ///
    /// The buffer is authoritative: if the view holds different content at
    /// bind time it is force-set to the buffer's.
    pub fn bind(view: V, buffer: SharedBuffer, settings: BridgeSettings) -> Self {
        let id = BridgeId::new();
        let view = Arc::new(Mutex::new(view));
        {
            let mut v = lock(&view);
            let content = buffer.content();
            if v.content() != content {
                v.set_content(&content, EditOrigin::Remote);
            }
        }
        let settings = Arc::new(RwLock::new(settings));
        let observer = {
            let view = Arc::clone(&view);
            let settings = Arc::clone(&settings);
            buffer.observe(move |event| {
                if event.origin == EditOrigin::Local(id) {
                    // Our own transaction; the view already holds it.
                    return;
                }
                let mut v = lock(&view);
                let current = v.content();
                if current == event.content {
                    // Value-identical: applying would only churn the
                    // view and reset selection state.
                    return;
                }
                let Some(change) = minimal_change(&current, &event.content) else {
                    return;
                };
                let cursor = v.cursor();
                v.apply_change(&change, EditOrigin::Remote);
                if settings_of(&settings).preserve_cursor {
                    v.set_cursor(remap_cursor(cursor, &change));
                }
            })
        };
        tracing::debug!("[Bridge] {id} bound");
        Self {
            id,
            view,
            buffer,
            settings,
            _observer: observer,
        }
    }

    pub fn id(&self) -> BridgeId {
        self.id
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// Feed a user edit from the view into the buffer.
    ///
    /// Call after the view applied a user-origin change. The delta between
    /// buffer and view becomes one atomic transaction tagged with this
    /// bridge's id, so the bridge's own observer skips it. Returns
    /// whether the buffer was mutated.
    pub fn on_view_edit(&self) -> Result<bool, BufferError> {
        if settings_of(&self.settings).read_only {
            return Ok(false);
        }
        let new_content = lock(&self.view).content();
        let old_content = self.buffer.content();
        let Some(change) = minimal_change(&old_content, &new_content) else {
            return Ok(false);
        };
        self.buffer
            .apply_local_change(change.range.clone(), &change.insert, self.id)?;
        Ok(true)
    }

    pub fn settings(&self) -> BridgeSettings {
        settings_of(&self.settings)
    }

    pub fn update_settings(&self, settings: BridgeSettings) {
        match self.settings.write() {
            Ok(mut current) => *current = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }

    /// Run `f` against the bound view.
    pub fn with_view<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        f(&mut lock(&self.view))
    }

    /// Detach the view from the buffer. Equivalent to dropping.
    pub fn unbind(self) {}
}

impl<V: EditorView> Drop for EditorBridge<V> {
    fn drop(&mut self) {
        tracing::debug!("[Bridge] {} unbound", self.id);
    }
}

/// Shift a cursor position across a replacement so it stays on the same
/// logical spot where possible.
fn remap_cursor(cursor: usize, change: &TextChange) -> usize {
    if cursor <= change.range.start {
        cursor
    } else if cursor >= change.range.end {
        cursor - change.deleted_len() + change.insert.chars().count()
    } else {
        change.new_end()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn settings_of(settings: &RwLock<BridgeSettings>) -> BridgeSettings {
    match settings.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}
