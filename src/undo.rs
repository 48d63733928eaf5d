//! Undo Coordinator
//!
//! Undo and redo scoped to locally-originated operations. The document's
//! own history manager tracks only operations produced by this replica, so
//! a remote peer's edits are never popped or reverted, even when they are
//! the most recent operations applied to the buffer.
//!
//! Reverts replicate like ordinary edits: the coordinator emits a
//! local-origin buffer event after each step, which the transport forwards
//! to peers and other bridges apply to their views.

use loro::UndoManager as LoroUndoManager;

use crate::bridge::EditorView;
use crate::buffer::{BridgeId, EditOrigin, SharedBuffer};
use crate::diff::minimal_change;

/// Per-replica undo/redo driver for one document.
///
/// Create it alongside the session: only operations performed after
/// construction are tracked.
pub struct UndoCoordinator {
    id: BridgeId,
    buffer: SharedBuffer,
    manager: LoroUndoManager,
}

impl UndoCoordinator {
    pub fn new(buffer: &SharedBuffer) -> Self {
        Self::with_origin(buffer, BridgeId::new())
    }

    /// Create a coordinator whose events carry the given bridge's id.
    ///
    /// Use this when the view passed to [`Self::undo`] belongs to a bound
    /// bridge: the bridge then treats each revert as its own transaction
    /// and leaves the view to the coordinator, which updates it directly.
    pub fn for_bridge(buffer: &SharedBuffer, bridge: BridgeId) -> Self {
        Self::with_origin(buffer, bridge)
    }

    fn with_origin(buffer: &SharedBuffer, id: BridgeId) -> Self {
        let manager = buffer.with_doc(LoroUndoManager::new);
        Self {
            id,
            buffer: buffer.clone(),
            manager,
        }
    }

    /// Whether there is a local operation to undo. An empty local stack
    /// means [`Self::undo`] is a no-op even if remote operations are the
    /// newest content in the buffer.
    pub fn can_undo(&self) -> bool {
        self.manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.manager.can_redo()
    }

    /// Revert the most recent local operation.
    ///
    /// On success the view is updated, focus returns to it, and the cursor
    /// parks at the end of the affected range. Returns `false` when there
    /// was nothing local to undo.
    pub fn undo<V: EditorView>(&mut self, view: &mut V) -> bool {
        self.step(view, StepKind::Undo)
    }

    /// Re-apply the most recently undone local operation.
    pub fn redo<V: EditorView>(&mut self, view: &mut V) -> bool {
        self.step(view, StepKind::Redo)
    }

    fn step<V: EditorView>(&mut self, view: &mut V, kind: StepKind) -> bool {
        let available = match kind {
            StepKind::Undo => self.manager.can_undo(),
            StepKind::Redo => self.manager.can_redo(),
        };
        if !available {
            return false;
        }

        let before = self.buffer.content();
        let stepped = match kind {
            StepKind::Undo => self.manager.undo().is_ok(),
            StepKind::Redo => self.manager.redo().is_ok(),
        };
        if !stepped {
            tracing::warn!("[Undo] {kind:?} step failed");
            return false;
        }
        let after = self.buffer.content();
        if before == after {
            return false;
        }

        // Replicate the revert: peers and sibling bridges consume this
        // event like any other local edit.
        self.buffer.notify_local_mutation(self.id);

        // Bring the view in line. Tagged Remote so the host does not feed
        // it back as a fresh user edit.
        if let Some(change) = minimal_change(&view.content(), &after) {
            view.apply_change(&change, EditOrigin::Remote);
        }
        if let Some(change) = minimal_change(&before, &after) {
            view.set_cursor(change.new_end());
        }
        view.focus();
        true
    }
}

#[derive(Debug, Clone, Copy)]
enum StepKind {
    Undo,
    Redo,
}
