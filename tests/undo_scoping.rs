//! Undo scoping: local operations only, remote edits stay untouched.

mod common;

use coedit::{
    BridgeId, BridgeSettings, EditorBridge, EditorView, SharedBuffer, SyncHub, UndoCoordinator,
};
use common::{identity, replica, wait_until, TestView};

#[tokio::test]
async fn test_undo_reverts_local_edit_only() {
    let hub = SyncHub::new();
    let alice = replica(&hub).await;
    let bob = replica(&hub).await;

    let a = alice
        .open_document_session("doc.rs", "", identity("u1", "Alice"))
        .await
        .unwrap();
    let b = bob
        .open_document_session("doc.rs", "", identity("u2", "Bob"))
        .await
        .unwrap();

    let mut undo = UndoCoordinator::new(&a.buffer);
    a.buffer
        .apply_local_change(0..0, "local-edit ", BridgeId::new())
        .unwrap();

    // Bob's edit arrives after Alice's and is the newest operation.
    let bb = b.buffer.clone();
    assert!(wait_until(move || bb.content() == "local-edit ").await);
    b.buffer
        .apply_local_change(11..11, "remote-edit", BridgeId::new())
        .unwrap();
    let ab = a.buffer.clone();
    assert!(wait_until(move || ab.content() == "local-edit remote-edit").await);

    // Undo on Alice's side pops her own operation, not Bob's newer one.
    let mut view = TestView::new(&a.buffer.content());
    assert!(undo.undo(&mut view));
    assert_eq!(a.buffer.content(), "remote-edit");
    assert_eq!(view.content(), "remote-edit");
    assert!(view.focused);

    // The revert replicates to Bob like any other edit.
    let bb = b.buffer.clone();
    assert!(wait_until(move || bb.content() == "remote-edit").await);

    alice.close_document_session("doc.rs").await.unwrap();
    bob.close_document_session("doc.rs").await.unwrap();
}

#[tokio::test]
async fn test_undo_with_empty_local_stack_is_a_no_op() {
    let hub = SyncHub::new();
    let alice = replica(&hub).await;
    let bob = replica(&hub).await;

    let a = alice
        .open_document_session("doc.rs", "", identity("u1", "Alice"))
        .await
        .unwrap();
    let b = bob
        .open_document_session("doc.rs", "", identity("u2", "Bob"))
        .await
        .unwrap();

    let mut undo = UndoCoordinator::new(&a.buffer);
    b.buffer
        .apply_local_change(0..0, "only remote content", BridgeId::new())
        .unwrap();
    let ab = a.buffer.clone();
    assert!(wait_until(move || ab.content() == "only remote content").await);

    // Alice never edited; undo must not touch the remote operations.
    assert!(!undo.can_undo());
    let mut view = TestView::new(&a.buffer.content());
    assert!(!undo.undo(&mut view));
    assert_eq!(a.buffer.content(), "only remote content");

    alice.close_document_session("doc.rs").await.unwrap();
    bob.close_document_session("doc.rs").await.unwrap();
}

#[tokio::test]
async fn test_redo_restores_undone_edit() {
    let buffer = SharedBuffer::new();
    let mut undo = UndoCoordinator::new(&buffer);
    buffer
        .apply_local_change(0..0, "restore me", BridgeId::new())
        .unwrap();

    let mut view = TestView::new(&buffer.content());
    assert!(undo.undo(&mut view));
    assert_eq!(buffer.content(), "");

    assert!(undo.can_redo());
    assert!(undo.redo(&mut view));
    assert_eq!(buffer.content(), "restore me");
    assert_eq!(view.content(), "restore me");
}

#[tokio::test]
async fn test_undo_parks_cursor_at_end_of_affected_range() {
    let buffer = SharedBuffer::new();
    buffer
        .apply_local_change(0..0, "prefix ", BridgeId::new())
        .unwrap();

    let mut undo = UndoCoordinator::new(&buffer);
    buffer
        .apply_local_change(7..7, "typed", BridgeId::new())
        .unwrap();

    let mut view = TestView::new(&buffer.content());
    view.set_cursor(12);
    assert!(undo.undo(&mut view));
    assert_eq!(buffer.content(), "prefix ");
    // The deletion collapsed at offset 7; the cursor parks there.
    assert_eq!(view.cursor(), 7);
}

#[tokio::test]
async fn test_undo_through_a_bound_view() {
    let buffer = SharedBuffer::new();
    let bridge = EditorBridge::bind(TestView::new(""), buffer.clone(), BridgeSettings::default());
    let mut undo = UndoCoordinator::for_bridge(&buffer, bridge.id());

    bridge.with_view(|v| v.type_text(0, "typed"));
    bridge.on_view_edit().unwrap();
    assert_eq!(buffer.content(), "typed");

    // The coordinator shares the bridge's id, so the bridge treats the
    // revert as its own transaction and the coordinator alone updates the
    // locked view.
    assert!(bridge.with_view(|v| undo.undo(v)));
    assert_eq!(buffer.content(), "");
    assert_eq!(bridge.with_view(|v| v.content()), "");
}

#[tokio::test]
async fn test_operations_before_coordinator_are_out_of_scope() {
    let buffer = SharedBuffer::new();
    buffer
        .apply_local_change(0..0, "pre-existing", BridgeId::new())
        .unwrap();

    let undo = UndoCoordinator::new(&buffer);
    assert!(!undo.can_undo());
}
